//! Transcoding service contract.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{binary} exited with {status}: {stderr}")]
    ProcessFailed {
        binary: String,
        status: String,
        stderr: String,
    },

    #[error("unreadable probe output: {0}")]
    Probe(String),

    #[error("no output produced: {0}")]
    NoOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations on a job's transient local files.
///
/// Implementations are stateless; every call is independent.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Whether the container carries at least one audio stream.
    async fn has_audio_track(&self, video: &Path) -> Result<bool, TranscodeError>;

    /// Write the audio track to `output`; the format follows the output extension.
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<(), TranscodeError>;

    /// Render `count` still frames into `output_dir` as `{stem}-{n}.png`,
    /// returning the files in order.
    async fn generate_thumbnails(
        &self,
        video: &Path,
        output_dir: &Path,
        stem: &str,
        count: usize,
    ) -> Result<Vec<PathBuf>, TranscodeError>;

    /// Container duration in seconds, if the probe reports one.
    async fn probe_duration(&self, video: &Path) -> Result<Option<f64>, TranscodeError>;
}
