use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

use super::job::Step;
use super::video::RecognitionOutcome;

/// Logical progress track, so subscribers can tell processing from recognition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProgressTrack {
    Processing,
    Recognition,
}

impl Display for ProgressTrack {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProgressTrack::Processing => write!(f, "processing"),
            ProgressTrack::Recognition => write!(f, "recognition"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Progress,
    /// The provisional record exists and the caller has been acknowledged.
    UploadCompleted,
    ProcessingCompleted { thumbnail_url: Option<String> },
    RecognitionCompleted { outcome: RecognitionOutcome },
    Failed { step: Step, message: String },
}

/// A notification published on the progress bus, scoped to one channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub channel_id: String,
    pub job_id: Uuid,
    pub video_id: Option<Uuid>,
    pub track: ProgressTrack,
    /// Always within 0..=100.
    pub percent: u8,
    pub label: String,
    pub kind: EventKind,
    pub emitted_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        channel_id: impl Into<String>,
        job_id: Uuid,
        track: ProgressTrack,
        percent: u8,
        label: impl Into<String>,
        kind: EventKind,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            job_id,
            video_id: None,
            track,
            percent: percent.min(100),
            label: label.into(),
            kind,
            emitted_at: Utc::now(),
        }
    }

    pub fn with_video(mut self, video_id: Uuid) -> Self {
        self.video_id = Some(video_id);
        self
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.kind, EventKind::Failed { .. })
    }
}
