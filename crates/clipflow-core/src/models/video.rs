use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

use crate::constants::RECOGNITION_SUCCESS;

/// Who may watch a video. New records always start `Private`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "video_visibility", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    Public,
    CopyrightClaimed,
}

impl Display for Visibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Visibility::Private => write!(f, "private"),
            Visibility::Public => write!(f, "public"),
            Visibility::CopyrightClaimed => write!(f, "copyright_claimed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "processing_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    /// Provisional record; background stages have not finished.
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Display for ProcessingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::Processing => write!(f, "processing"),
            ProcessingStatus::Completed => write!(f, "completed"),
            ProcessingStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of the background-music fingerprint lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecognitionOutcome {
    Matched { payload: JsonValue },
    NoMatch,
    /// No lookup happened: no audio track, extraction failed, or the service errored.
    Skipped,
}

impl RecognitionOutcome {
    /// Collapse a service reply into an outcome. Only an explicit success code
    /// with a non-empty payload is a match.
    pub fn from_status(status_code: i64, payload: JsonValue) -> Self {
        let empty = match &payload {
            JsonValue::Null => true,
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Array(items) => items.is_empty(),
            _ => false,
        };
        if status_code == RECOGNITION_SUCCESS && !empty {
            RecognitionOutcome::Matched { payload }
        } else {
            RecognitionOutcome::NoMatch
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, RecognitionOutcome::Matched { .. })
    }
}

/// The durable metadata record read by everything outside the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoRecord {
    pub id: Uuid,
    /// Object-store key of the primary video; unique per record.
    pub video_key: String,
    pub owner_id: String,
    pub channel_id: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub duration: Option<f64>,
    pub size_bytes: i64,
    pub visibility: Visibility,
    pub processing_status: ProcessingStatus,
    /// `None` while the recognition stage has not run yet (provisional records).
    pub recognition: Option<RecognitionOutcome>,
    pub audio_key: Option<String>,
    pub thumbnail_keys: Vec<String>,
    pub primary_thumbnail_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    /// Build a fresh record from a draft. Visibility is always private.
    pub fn from_draft(draft: VideoDraft, size_bytes: i64) -> Self {
        let now = Utc::now();
        let primary_thumbnail_key = draft
            .primary_thumbnail_key
            .or_else(|| draft.thumbnail_keys.first().cloned());
        Self {
            id: Uuid::new_v4(),
            video_key: draft.video_key,
            owner_id: draft.owner_id,
            channel_id: draft.channel_id,
            title: draft.title,
            description: draft.description,
            tags: draft.tags,
            duration: draft.duration,
            size_bytes,
            visibility: Visibility::Private,
            processing_status: draft.processing_status,
            recognition: draft.recognition,
            audio_key: draft.audio_key,
            thumbnail_keys: draft.thumbnail_keys,
            primary_thumbnail_key,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-applying a draft for an existing key keeps identity, visibility and
    /// creation time and overwrites everything the draft carries.
    pub fn merge_draft(&mut self, draft: VideoDraft, size_bytes: i64) {
        self.primary_thumbnail_key = draft
            .primary_thumbnail_key
            .or_else(|| draft.thumbnail_keys.first().cloned());
        self.owner_id = draft.owner_id;
        self.channel_id = draft.channel_id;
        self.title = draft.title;
        self.description = draft.description;
        self.tags = draft.tags;
        self.duration = draft.duration;
        self.size_bytes = size_bytes;
        self.processing_status = draft.processing_status;
        self.recognition = draft.recognition;
        self.audio_key = draft.audio_key;
        self.thumbnail_keys = draft.thumbnail_keys;
        self.updated_at = Utc::now();
    }

    pub fn apply_patch(&mut self, patch: VideoPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(duration) = patch.duration {
            self.duration = Some(duration);
        }
        if let Some(visibility) = patch.visibility {
            self.visibility = visibility;
        }
        if let Some(status) = patch.processing_status {
            self.processing_status = status;
        }
        if let Some(recognition) = patch.recognition {
            self.recognition = Some(recognition);
        }
        if let Some(audio_key) = patch.audio_key {
            self.audio_key = Some(audio_key);
        }
        if let Some(keys) = patch.thumbnail_keys {
            if self
                .primary_thumbnail_key
                .as_ref()
                .map_or(true, |current| !keys.contains(current))
            {
                self.primary_thumbnail_key = keys.first().cloned();
            }
            self.thumbnail_keys = keys;
        }
        if let Some(primary) = patch.primary_thumbnail_key {
            self.primary_thumbnail_key = Some(primary);
        }
        self.updated_at = Utc::now();
    }
}

/// Input for creating a record. The size is not part of the draft: persistence
/// derives it from the stored blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoDraft {
    pub video_key: String,
    pub owner_id: String,
    pub channel_id: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub duration: Option<f64>,
    pub processing_status: ProcessingStatus,
    pub recognition: Option<RecognitionOutcome>,
    pub audio_key: Option<String>,
    pub thumbnail_keys: Vec<String>,
    pub primary_thumbnail_key: Option<String>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VideoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub duration: Option<f64>,
    pub visibility: Option<Visibility>,
    pub processing_status: Option<ProcessingStatus>,
    pub recognition: Option<RecognitionOutcome>,
    pub audio_key: Option<String>,
    pub thumbnail_keys: Option<Vec<String>>,
    pub primary_thumbnail_key: Option<String>,
}
