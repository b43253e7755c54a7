//! clipflow: ingest a video file through the pipeline from the command line.
//!
//! Configuration comes from the environment (see `IngestConfig::from_env`).

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use clipflow_core::models::UploadRequest;
use clipflow_core::IngestConfig;
use clipflow_db::{create_record_store, VideoCatalog};
use clipflow_infra::{init_telemetry, shutdown_telemetry, LogFormat};
use clipflow_pipeline::{
    ChannelAuthorizer, JwtChannelAuthorizer, OpenChannels, Orchestrator, PipelineServices,
    ProgressBus,
};
use clipflow_processing::{FFmpegTranscoder, HttpRecognizer, Recognizer};
use clipflow_storage::create_storage;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const FOLLOW_TOKEN_TTL: Duration = Duration::from_secs(3600);

#[derive(Parser)]
#[command(name = "clipflow", about = "Video ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Run every stage before returning
    Eager,
    /// Persist a provisional record, finish in the background
    Deferred,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a local video file
    Ingest {
        /// Path to the video file
        file: PathBuf,
        /// Owner of the new record
        #[arg(long)]
        owner: String,
        /// Channel that receives progress events
        #[arg(long)]
        channel: String,
        #[arg(long, value_enum, default_value = "eager")]
        mode: Mode,
        /// Defaults to the file name without its extension
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Print progress events as JSON lines while the job runs
        #[arg(long)]
        follow: bool,
    },
    /// Apply database migrations
    Migrate,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IngestConfig::from_env().context("Failed to load configuration")?;
    let format = config
        .log_format
        .parse::<LogFormat>()
        .map_err(anyhow::Error::msg)?;
    init_telemetry("clipflow", format).map_err(|e| anyhow::anyhow!(e))?;

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Migrate => migrate(&config).await,
        Commands::Ingest {
            file,
            owner,
            channel,
            mode,
            title,
            description,
            tags,
            follow,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("File path has no usable file name")?;

            let mut upload = UploadRequest::new(owner, channel, file_name, data).with_tags(tags);
            if let Some(title) = title {
                upload = upload.with_title(title);
            }
            if let Some(description) = description {
                upload = upload.with_description(description);
            }
            ingest(&config, upload, mode, follow).await
        }
    };

    shutdown_telemetry().await;
    result
}

async fn migrate(config: &IngestConfig) -> anyhow::Result<()> {
    let url = config
        .database
        .url
        .as_deref()
        .context("DATABASE_URL is required for migrate")?;
    let pool = clipflow_db::connect(url, &config.database).await?;
    clipflow_db::run_migrations(&pool).await?;
    Ok(())
}

async fn ingest(
    config: &IngestConfig,
    upload: UploadRequest,
    mode: Mode,
    follow: bool,
) -> anyhow::Result<()> {
    config.validate()?;

    let storage = create_storage(&config.storage)
        .await
        .context("Failed to initialize storage")?;
    let store = create_record_store(&config.database).await?;
    let catalog = VideoCatalog::new(store, storage.clone());
    let transcoder = Arc::new(FFmpegTranscoder::new(&config.transcoder)?);
    let recognizer = match &config.recognition {
        Some(settings) => Some(Arc::new(HttpRecognizer::new(settings)?) as Arc<dyn Recognizer>),
        None => {
            tracing::info!("RECOGNITION_ENDPOINT not set; music recognition disabled");
            None
        }
    };

    let (authorizer, credential): (Arc<dyn ChannelAuthorizer>, String) =
        match &config.channel_token_secret {
            Some(secret) => {
                let jwt = JwtChannelAuthorizer::new(secret);
                let token = jwt.issue(&upload.channel_id, FOLLOW_TOKEN_TTL)?;
                (Arc::new(jwt), token)
            }
            None => {
                tracing::warn!("CHANNEL_TOKEN_SECRET not set; progress channels are open");
                (Arc::new(OpenChannels), String::new())
            }
        };
    let bus = ProgressBus::new(config.progress_bus_capacity, authorizer);

    let printer = if follow {
        let mut subscription = bus.subscribe(&upload.channel_id, &credential)?;
        Some(tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "Could not serialize progress event"),
                }
            }
        }))
    } else {
        None
    };

    let orchestrator = Orchestrator::new(
        PipelineServices {
            storage,
            transcoder,
            recognizer,
            catalog,
            bus: bus.clone(),
        },
        config.pipeline.clone(),
    );

    let result = run(&orchestrator, upload, mode).await;

    bus.shutdown();
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            tracing::warn!(error = %e, "Progress printer stopped unexpectedly");
        }
    }
    result
}

async fn run(orchestrator: &Orchestrator, upload: UploadRequest, mode: Mode) -> anyhow::Result<()> {
    let ttl = orchestrator.settings().signed_url_ttl;
    let record = match mode {
        Mode::Eager => orchestrator.run_eager(upload).await?,
        Mode::Deferred => {
            let handle = orchestrator.run_deferred(upload).await?;
            tracing::info!(video_id = %handle.record.id, "Provisional record created");
            let outcome = handle.wait().await?;
            if let Err(e) = &outcome.thumbnails {
                tracing::warn!(error = %e, "Thumbnails were not produced");
            }
            outcome
                .record
                .context("Background processing could not update the record")?
        }
    };

    print_json(&record)?;
    match orchestrator.catalog().signed_view(&record, ttl).await {
        Ok(view) => print_json(&view)?,
        Err(e) => tracing::warn!(error = %e, "Could not sign record URLs"),
    }
    Ok(())
}
