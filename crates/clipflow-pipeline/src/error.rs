//! Pipeline error taxonomy.

use clipflow_core::models::{Step, TransitionError};
use clipflow_core::ValidationError;
use clipflow_db::PersistenceError;
use clipflow_processing::{RecognitionError, TranscodeError};
use clipflow_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// How a failure affects the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort remaining stages, clean up, report the job failed.
    Fatal,
    /// Fold into the job's optional fields and keep going.
    Degraded,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid upload: {0}")]
    Validation(#[from] ValidationError),

    #[error("{step} failed: {source}")]
    Transcoding {
        step: Step,
        #[source]
        source: TranscodeError,
    },

    #[error("recognition failed: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("{step} storage operation failed: {source}")]
    Storage {
        step: Step,
        #[source]
        source: StorageError,
    },

    #[error("saving video record failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("{step} timed out after {after:?}")]
    Timeout { step: Step, after: Duration },

    #[error("local file operation during {step} failed: {source}")]
    Io {
        step: Step,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("background task failed: {0}")]
    Background(String),
}

impl IngestError {
    /// The step that was running when the error happened.
    pub fn step(&self) -> Step {
        match self {
            IngestError::Validation(_) => Step::Receive,
            IngestError::Transcoding { step, .. }
            | IngestError::Storage { step, .. }
            | IngestError::Timeout { step, .. }
            | IngestError::Io { step, .. } => *step,
            IngestError::Recognition(_) => Step::Recognize,
            IngestError::Persistence(_) => Step::Persist,
            IngestError::Transition(_) | IngestError::Background(_) => Step::Receive,
        }
    }

    pub fn severity(&self) -> Severity {
        classify(self.step(), self)
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// The single fatal/degraded table.
///
/// | step               | severity |
/// |--------------------|----------|
/// | extract, recognize | degraded |
/// | cleanup            | degraded |
/// | everything else    | fatal    |
///
/// Recognition errors degrade wherever they surface; validation, persistence
/// and state-machine errors are always fatal.
pub fn classify(step: Step, error: &IngestError) -> Severity {
    match error {
        IngestError::Recognition(_) => Severity::Degraded,
        IngestError::Validation(_)
        | IngestError::Persistence(_)
        | IngestError::Transition(_)
        | IngestError::Background(_) => Severity::Fatal,
        _ => match step {
            Step::Extract | Step::Recognize | Step::Cleanup => Severity::Degraded,
            Step::Receive | Step::Probe | Step::Thumbnail | Step::Upload | Step::Persist => {
                Severity::Fatal
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn transcode(step: Step) -> IngestError {
        IngestError::Transcoding {
            step,
            source: TranscodeError::NoOutput("out.png".into()),
        }
    }

    #[test]
    fn transcoding_is_fatal_only_for_probe_and_thumbnail() {
        assert_eq!(transcode(Step::Probe).severity(), Severity::Fatal);
        assert_eq!(transcode(Step::Thumbnail).severity(), Severity::Fatal);
        assert_eq!(transcode(Step::Extract).severity(), Severity::Degraded);
    }

    #[test]
    fn recognition_always_degrades() {
        let err = IngestError::Recognition(RecognitionError::Transport("reset".into()));
        assert_eq!(err.step(), Step::Recognize);
        assert_eq!(err.severity(), Severity::Degraded);
        let timeout = IngestError::Timeout {
            step: Step::Recognize,
            after: Duration::from_secs(1),
        };
        assert_eq!(timeout.severity(), Severity::Degraded);
    }

    #[test]
    fn storage_is_fatal_for_uploads_not_cleanup() {
        let upload = IngestError::Storage {
            step: Step::Upload,
            source: StorageError::UploadFailed("503".into()),
        };
        let cleanup = IngestError::Storage {
            step: Step::Cleanup,
            source: StorageError::DeleteFailed("busy".into()),
        };
        assert!(upload.is_fatal());
        assert!(!cleanup.is_fatal());
    }

    #[test]
    fn persistence_and_validation_are_fatal() {
        assert!(IngestError::Persistence(PersistenceError::NotFound(Uuid::nil())).is_fatal());
        assert!(IngestError::Validation(ValidationError::EmptyUpload).is_fatal());
        let timeout = IngestError::Timeout {
            step: Step::Thumbnail,
            after: Duration::from_secs(5),
        };
        assert!(timeout.is_fatal());
    }
}
