//! Test helpers: a pipeline wired to in-memory collaborators.
//!
//! Nothing here needs ffmpeg, network access or PostgreSQL.

#![allow(dead_code)]

pub mod services;
pub mod storage;

use clipflow_core::models::{ProgressEvent, ProgressTrack, UploadRequest};
use clipflow_core::PipelineSettings;
use clipflow_db::{InMemoryVideoRepository, VideoCatalog};
use clipflow_pipeline::{OpenChannels, Orchestrator, PipelineServices, ProgressBus, Subscription};
use clipflow_processing::Recognizer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub use services::{Script, ScriptedRecognizer, ScriptedTranscoder};
pub use storage::MemoryStorage;

pub const CHANNEL: &str = "channel-1";
pub const OWNER: &str = "owner-1";

pub struct TestPipeline {
    pub orchestrator: Orchestrator,
    pub bus: ProgressBus,
    pub repo: InMemoryVideoRepository,
    pub storage: MemoryStorage,
    pub transcoder: Arc<ScriptedTranscoder>,
    pub work_dir: TempDir,
}

impl TestPipeline {
    pub fn subscribe(&self) -> Subscription {
        self.bus
            .subscribe(CHANNEL, "")
            .expect("open channels accept any subscriber")
    }

    /// Files still present under the work dir.
    pub fn leftover_files(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_files(self.work_dir.path(), &mut found);
        found
    }
}

fn collect_files(dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, found);
        } else {
            found.push(path);
        }
    }
}

pub fn settings(work_dir: &Path) -> PipelineSettings {
    PipelineSettings {
        work_dir: work_dir.to_path_buf(),
        stage_timeout: Duration::from_secs(5),
        upload_timeout: Duration::from_secs(5),
        persist_retry_base: Duration::from_millis(1),
        ..Default::default()
    }
}

pub fn build(
    transcoder: ScriptedTranscoder,
    recognizer: Option<Arc<ScriptedRecognizer>>,
    storage: MemoryStorage,
) -> TestPipeline {
    build_with(transcoder, recognizer, storage, |_| {})
}

pub fn build_with(
    transcoder: ScriptedTranscoder,
    recognizer: Option<Arc<ScriptedRecognizer>>,
    storage: MemoryStorage,
    tweak: impl FnOnce(&mut PipelineSettings),
) -> TestPipeline {
    let work_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let mut settings = settings(work_dir.path());
    tweak(&mut settings);

    let repo = InMemoryVideoRepository::new();
    let bus = ProgressBus::new(1024, Arc::new(OpenChannels));
    let transcoder = Arc::new(transcoder);
    let storage_handle: Arc<dyn clipflow_storage::Storage> = Arc::new(storage.clone());
    let services = PipelineServices {
        storage: storage_handle.clone(),
        transcoder: transcoder.clone(),
        recognizer: recognizer.map(|r| r as Arc<dyn Recognizer>),
        catalog: VideoCatalog::new(Arc::new(repo.clone()), storage_handle),
        bus: bus.clone(),
    };

    TestPipeline {
        orchestrator: Orchestrator::new(services, settings),
        bus,
        repo,
        storage,
        transcoder,
        work_dir,
    }
}

pub fn upload(data: &[u8]) -> UploadRequest {
    UploadRequest::new(OWNER, CHANNEL, "Holiday Clip.mp4", data.to_vec())
}

/// Everything published so far, waiting briefly for stragglers.
pub async fn drain(subscription: &mut Subscription) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(100), subscription.recv()).await
    {
        events.push(event);
    }
    events
}

pub fn percents(events: &[ProgressEvent], track: ProgressTrack) -> Vec<u8> {
    events
        .iter()
        .filter(|e| e.track == track)
        .map(|e| e.percent)
        .collect()
}

pub fn assert_monotonic(values: &[u8]) {
    assert!(
        values.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {values:?}"
    );
}
