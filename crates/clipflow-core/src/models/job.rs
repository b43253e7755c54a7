use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

use super::video::{ProcessingStatus, RecognitionOutcome, VideoDraft, Visibility};

/// A unit of pipeline work. Failures are attributed to the step that was running.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Receive,
    Probe,
    Extract,
    Recognize,
    Thumbnail,
    Upload,
    Persist,
    Cleanup,
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Step::Receive => "receive",
            Step::Probe => "probe",
            Step::Extract => "extract",
            Step::Recognize => "recognize",
            Step::Thumbnail => "thumbnail",
            Step::Upload => "upload",
            Step::Persist => "persist",
            Step::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Pipeline state of a job.
///
/// States only move forward. `AudioExtracted` and `NoAudio` are alternatives
/// at the same position; `Failed` is reachable from any non-terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Stage {
    Received,
    ProbeComplete,
    AudioExtracted,
    NoAudio,
    Recognized,
    ThumbnailsGenerated,
    ArtifactsUploaded,
    Persisted,
    CleanedUp,
    Failed { step: Step, cause: String },
}

impl Stage {
    fn rank(&self) -> Option<u8> {
        match self {
            Stage::Received => Some(0),
            Stage::ProbeComplete => Some(1),
            Stage::AudioExtracted | Stage::NoAudio => Some(2),
            Stage::Recognized => Some(3),
            Stage::ThumbnailsGenerated => Some(4),
            Stage::ArtifactsUploaded => Some(5),
            Stage::Persisted => Some(6),
            Stage::CleanedUp => Some(7),
            Stage::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::CleanedUp | Stage::Failed { .. })
    }

    pub fn can_transition_to(&self, next: &Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Received => "Upload received",
            Stage::ProbeComplete => "Tracks probed",
            Stage::AudioExtracted => "Audio extracted",
            Stage::NoAudio => "No audio track",
            Stage::Recognized => "Music recognition finished",
            Stage::ThumbnailsGenerated => "Thumbnails generated",
            Stage::ArtifactsUploaded => "Artifacts uploaded",
            Stage::Persisted => "Record saved",
            Stage::CleanedUp => "Processing complete",
            Stage::Failed { .. } => "Processing failed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid stage transition from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: Stage,
    pub to: Stage,
}

/// One end-to-end ingestion of a single uploaded video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: Uuid,
    pub owner_id: String,
    pub channel_id: String,
    /// Key of the original upload; also its path relative to the work dir.
    pub raw_video_key: String,
    pub audio_key: Option<String>,
    pub recognition: Option<RecognitionOutcome>,
    pub thumbnail_keys: Vec<String>,
    pub primary_thumbnail_key: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub duration: Option<f64>,
    pub size_bytes: Option<u64>,
    pub visibility: Visibility,
    pub stage: Stage,
    pub received_at: DateTime<Utc>,
}

impl IngestionJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner_id: impl Into<String>,
        channel_id: impl Into<String>,
        raw_video_key: impl Into<String>,
        title: impl Into<String>,
        description: Option<String>,
        tags: Vec<String>,
        duration: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            channel_id: channel_id.into(),
            raw_video_key: raw_video_key.into(),
            audio_key: None,
            recognition: None,
            thumbnail_keys: Vec::new(),
            primary_thumbnail_key: None,
            title: title.into(),
            description,
            tags,
            duration,
            size_bytes: None,
            visibility: Visibility::Private,
            stage: Stage::Received,
            received_at: Utc::now(),
        }
    }

    pub fn transition(&mut self, next: Stage) -> Result<(), TransitionError> {
        if !self.stage.can_transition_to(&next) {
            return Err(TransitionError {
                from: self.stage.clone(),
                to: next,
            });
        }
        self.stage = next;
        Ok(())
    }

    /// Mark the job failed. No-op once the job is already terminal.
    pub fn fail(&mut self, step: Step, cause: impl Into<String>) {
        if !self.stage.is_terminal() {
            self.stage = Stage::Failed {
                step,
                cause: cause.into(),
            };
        }
    }

    /// Record generated thumbnails and move to `ThumbnailsGenerated`.
    /// An empty candidate list is rejected: a video needs a presentable thumbnail.
    pub fn set_thumbnails(&mut self, keys: Vec<String>) -> Result<(), TransitionError> {
        if keys.is_empty() {
            return Err(TransitionError {
                from: self.stage.clone(),
                to: Stage::ThumbnailsGenerated,
            });
        }
        self.transition(Stage::ThumbnailsGenerated)?;
        self.primary_thumbnail_key = keys.first().cloned();
        self.thumbnail_keys = keys;
        Ok(())
    }

    pub fn primary_thumbnail(&self) -> Option<&str> {
        self.primary_thumbnail_key
            .as_deref()
            .or_else(|| self.thumbnail_keys.first().map(String::as_str))
    }

    pub fn to_draft(&self, processing_status: ProcessingStatus) -> VideoDraft {
        VideoDraft {
            video_key: self.raw_video_key.clone(),
            owner_id: self.owner_id.clone(),
            channel_id: self.channel_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            duration: self.duration,
            processing_status,
            recognition: self.recognition.clone(),
            audio_key: self.audio_key.clone(),
            thumbnail_keys: self.thumbnail_keys.clone(),
            primary_thumbnail_key: self.primary_thumbnail_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> IngestionJob {
        IngestionJob::new("u1", "c1", "videos/a.mp4", "a", None, vec![], None)
    }

    #[test]
    fn happy_path_transitions_are_accepted() {
        let mut job = job();
        for next in [
            Stage::ProbeComplete,
            Stage::AudioExtracted,
            Stage::Recognized,
        ] {
            job.transition(next).unwrap();
        }
        job.set_thumbnails(vec!["thumbnails/a-1.png".into()]).unwrap();
        for next in [Stage::ArtifactsUploaded, Stage::Persisted, Stage::CleanedUp] {
            job.transition(next).unwrap();
        }
        assert!(job.stage.is_terminal());
    }

    #[test]
    fn audio_alternatives_are_exclusive() {
        let mut job = job();
        job.transition(Stage::ProbeComplete).unwrap();
        job.transition(Stage::NoAudio).unwrap();
        assert!(job.transition(Stage::AudioExtracted).is_err());
    }

    #[test]
    fn backwards_moves_are_rejected() {
        let mut job = job();
        job.transition(Stage::ProbeComplete).unwrap();
        assert!(job.transition(Stage::Received).is_err());
    }

    #[test]
    fn failed_is_terminal() {
        let mut job = job();
        job.fail(Step::Thumbnail, "ffmpeg exited 1");
        assert!(job.stage.is_terminal());
        assert!(job.transition(Stage::CleanedUp).is_err());
        job.fail(Step::Persist, "ignored");
        assert_eq!(
            job.stage,
            Stage::Failed {
                step: Step::Thumbnail,
                cause: "ffmpeg exited 1".into()
            }
        );
    }

    #[test]
    fn empty_thumbnail_list_is_rejected() {
        let mut job = job();
        job.transition(Stage::ProbeComplete).unwrap();
        assert!(job.set_thumbnails(vec![]).is_err());
        assert_eq!(job.stage, Stage::ProbeComplete);
    }
}
