//! Configuration module
//!
//! Settings for the ingestion pipeline and the services it drives, loaded from
//! the environment (and an optional `.env` file).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_AUDIO_FORMAT, DEFAULT_SIGNED_URL_TTL_SECS, DEFAULT_THUMBNAIL_COUNT,
    DEFAULT_THUMBNAIL_SIZE,
};
use crate::storage_types::StorageBackend;
use crate::validation::UploadLimits;

const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_VIDEO_SIZE_MB: usize = 500;
const STAGE_TIMEOUT_SECS: u64 = 300;
const UPLOAD_TIMEOUT_SECS: u64 = 600;
const PERSIST_MAX_RETRIES: u32 = 3;
const PERSIST_RETRY_BASE_MS: u64 = 200;
const MAX_CONCURRENT_JOBS: usize = 4;
const PROGRESS_BUS_CAPACITY: usize = 256;
const RECOGNITION_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO etc.)
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DatabaseSettings {
    /// `None` runs against the in-memory record store.
    pub url: Option<String>,
    pub max_connections: u32,
    pub timeout_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct TranscoderSettings {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// `WIDTHxHEIGHT`
    pub thumbnail_size: String,
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct RecognitionSettings {
    pub endpoint: String,
    pub access_key: String,
    pub access_secret: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for RecognitionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionSettings")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("access_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Knobs read by the orchestrator. Tests build this directly.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Root for transient files; relative paths under it mirror store keys.
    pub work_dir: PathBuf,
    pub thumbnail_count: usize,
    pub audio_format: String,
    pub stage_timeout: Duration,
    pub upload_timeout: Duration,
    pub persist_max_retries: u32,
    pub persist_retry_base: Duration,
    pub max_concurrent_jobs: usize,
    pub signed_url_ttl: Duration,
    pub upload_limits: UploadLimits,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            work_dir: env::temp_dir().join("clipflow"),
            thumbnail_count: DEFAULT_THUMBNAIL_COUNT,
            audio_format: DEFAULT_AUDIO_FORMAT.to_string(),
            stage_timeout: Duration::from_secs(STAGE_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(UPLOAD_TIMEOUT_SECS),
            persist_max_retries: PERSIST_MAX_RETRIES,
            persist_retry_base: Duration::from_millis(PERSIST_RETRY_BASE_MS),
            max_concurrent_jobs: MAX_CONCURRENT_JOBS,
            signed_url_ttl: Duration::from_secs(DEFAULT_SIGNED_URL_TTL_SECS),
            upload_limits: UploadLimits::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub storage: StorageSettings,
    pub database: DatabaseSettings,
    pub transcoder: TranscoderSettings,
    /// `None` disables recognition; every job then records `Skipped`.
    pub recognition: Option<RecognitionSettings>,
    pub pipeline: PipelineSettings,
    pub progress_bus_capacity: usize,
    pub channel_token_secret: Option<String>,
    pub log_format: String,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let backend = match env_opt("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::Local,
        };

        let storage = StorageSettings {
            backend,
            s3_bucket: env_opt("S3_BUCKET"),
            s3_region: env_opt("S3_REGION").or_else(|| env_opt("AWS_REGION")),
            s3_endpoint: env_opt("S3_ENDPOINT"),
            local_storage_path: env_opt("LOCAL_STORAGE_PATH"),
            local_storage_base_url: env_opt("LOCAL_STORAGE_BASE_URL"),
        };

        let database = DatabaseSettings {
            url: env_opt("DATABASE_URL"),
            max_connections: env_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            timeout_seconds: env_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
        };

        let transcoder = TranscoderSettings {
            ffmpeg_path: env_opt("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: env_opt("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".to_string()),
            thumbnail_size: env_opt("THUMBNAIL_SIZE")
                .unwrap_or_else(|| DEFAULT_THUMBNAIL_SIZE.to_string()),
        };

        let recognition = match env_opt("RECOGNITION_ENDPOINT") {
            Some(endpoint) => Some(RecognitionSettings {
                endpoint,
                access_key: env_opt("RECOGNITION_ACCESS_KEY").ok_or_else(|| {
                    anyhow::anyhow!("RECOGNITION_ACCESS_KEY is required with RECOGNITION_ENDPOINT")
                })?,
                access_secret: env_opt("RECOGNITION_ACCESS_SECRET").ok_or_else(|| {
                    anyhow::anyhow!(
                        "RECOGNITION_ACCESS_SECRET is required with RECOGNITION_ENDPOINT"
                    )
                })?,
                timeout: Duration::from_secs(env_or(
                    "RECOGNITION_TIMEOUT_SECS",
                    RECOGNITION_TIMEOUT_SECS,
                )),
            }),
            None => None,
        };

        let allowed_extensions = env_opt("VIDEO_ALLOWED_EXTENSIONS")
            .map(|list| {
                list.split(',')
                    .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| UploadLimits::default().allowed_extensions);

        let defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            work_dir: env_opt("INGEST_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            thumbnail_count: env_or("THUMBNAIL_COUNT", DEFAULT_THUMBNAIL_COUNT),
            audio_format: env_opt("AUDIO_FORMAT")
                .map(|f| f.to_lowercase())
                .unwrap_or_else(|| DEFAULT_AUDIO_FORMAT.to_string()),
            stage_timeout: Duration::from_secs(env_or("STAGE_TIMEOUT_SECS", STAGE_TIMEOUT_SECS)),
            upload_timeout: Duration::from_secs(env_or(
                "UPLOAD_TIMEOUT_SECS",
                UPLOAD_TIMEOUT_SECS,
            )),
            persist_max_retries: env_or("PERSIST_MAX_RETRIES", PERSIST_MAX_RETRIES),
            persist_retry_base: Duration::from_millis(env_or(
                "PERSIST_RETRY_BASE_MS",
                PERSIST_RETRY_BASE_MS,
            )),
            max_concurrent_jobs: env_or("MAX_CONCURRENT_JOBS", MAX_CONCURRENT_JOBS),
            signed_url_ttl: Duration::from_secs(env_or(
                "SIGNED_URL_TTL_SECS",
                DEFAULT_SIGNED_URL_TTL_SECS,
            )),
            upload_limits: UploadLimits {
                max_size_bytes: env_or("MAX_VIDEO_SIZE_MB", MAX_VIDEO_SIZE_MB) * 1024 * 1024,
                allowed_extensions,
            },
        };

        Ok(Self {
            storage,
            database,
            transcoder,
            recognition,
            pipeline,
            progress_bus_capacity: env_or("PROGRESS_BUS_CAPACITY", PROGRESS_BUS_CAPACITY),
            channel_token_secret: env_opt("CHANNEL_TOKEN_SECRET"),
            log_format: env_opt("LOG_FORMAT").unwrap_or_else(|| "pretty".to_string()),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!("S3_BUCKET is required when STORAGE_BACKEND=s3"));
                }
                if self.storage.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION is required when STORAGE_BACKEND=s3"
                    ));
                }
            }
            StorageBackend::Local => match &self.storage.local_storage_path {
                None => {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH is required when STORAGE_BACKEND=local"
                    ));
                }
                Some(path) if std::path::Path::new(path) == self.pipeline.work_dir => {
                    return Err(anyhow::anyhow!(
                        "INGEST_WORK_DIR must differ from LOCAL_STORAGE_PATH"
                    ));
                }
                Some(_) => {}
            },
        }

        if let Some(url) = &self.database.url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if self.pipeline.thumbnail_count == 0 {
            return Err(anyhow::anyhow!("THUMBNAIL_COUNT must be at least 1"));
        }
        if self.pipeline.max_concurrent_jobs == 0 {
            return Err(anyhow::anyhow!("MAX_CONCURRENT_JOBS must be at least 1"));
        }
        if self.progress_bus_capacity == 0 {
            return Err(anyhow::anyhow!("PROGRESS_BUS_CAPACITY must be at least 1"));
        }
        if self.pipeline.upload_limits.allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!("VIDEO_ALLOWED_EXTENSIONS must not be empty"));
        }
        if !is_valid_size(&self.transcoder.thumbnail_size) {
            return Err(anyhow::anyhow!(
                "THUMBNAIL_SIZE must look like WIDTHxHEIGHT, got '{}'",
                self.transcoder.thumbnail_size
            ));
        }
        if let Some(secret) = &self.channel_token_secret {
            if secret.len() < 32 {
                return Err(anyhow::anyhow!(
                    "CHANNEL_TOKEN_SECRET must be at least 32 characters long"
                ));
            }
        }
        Ok(())
    }
}

fn is_valid_size(size: &str) -> bool {
    match size.split_once('x') {
        Some((w, h)) => w.parse::<u32>().is_ok_and(|w| w > 0) && h.parse::<u32>().is_ok_and(|h| h > 0),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IngestConfig {
        IngestConfig {
            storage: StorageSettings {
                backend: StorageBackend::Local,
                s3_bucket: None,
                s3_region: None,
                s3_endpoint: None,
                local_storage_path: Some("/tmp/clipflow-store".into()),
                local_storage_base_url: None,
            },
            database: DatabaseSettings {
                url: None,
                max_connections: MAX_CONNECTIONS,
                timeout_seconds: CONNECTION_TIMEOUT_SECS,
            },
            transcoder: TranscoderSettings::default(),
            recognition: None,
            pipeline: PipelineSettings::default(),
            progress_bus_capacity: PROGRESS_BUS_CAPACITY,
            channel_token_secret: None,
            log_format: "pretty".into(),
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn s3_requires_bucket() {
        let mut c = config();
        c.storage.backend = StorageBackend::S3;
        c.storage.s3_region = Some("eu-west-1".into());
        assert!(c.validate().is_err());
        c.storage.s3_bucket = Some("videos".into());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_bad_thumbnail_size_and_short_secret() {
        let mut c = config();
        c.transcoder.thumbnail_size = "big".into();
        assert!(c.validate().is_err());

        let mut c = config();
        c.channel_token_secret = Some("short".into());
        assert!(c.validate().is_err());
    }

    #[test]
    fn work_dir_must_not_be_the_store() {
        let mut c = config();
        c.pipeline.work_dir = PathBuf::from("/tmp/clipflow-store");
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_non_postgres_url() {
        let mut c = config();
        c.database.url = Some("mysql://localhost/db".into());
        assert!(c.validate().is_err());
    }

    #[test]
    fn recognition_secret_is_redacted() {
        let settings = RecognitionSettings {
            endpoint: "https://id.example.com/v1/identify".into(),
            access_key: "key".into(),
            access_secret: "very-secret".into(),
            timeout: Duration::from_secs(5),
        };
        assert!(!format!("{settings:?}").contains("very-secret"));
    }
}
