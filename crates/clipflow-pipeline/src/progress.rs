//! Progress allocation tables and the per-track monotonic tracker.
//!
//! Each mode has one table per track. Fixed points are reported at stage
//! boundaries; bands are filled proportionally to bytes uploaded.

use clipflow_core::models::{EventKind, ProgressEvent, ProgressTrack, Step};
use std::sync::Mutex;
use uuid::Uuid;

use crate::bus::ProgressBus;

/// A percentage range filled in proportion to work done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub start: u8,
    pub end: u8,
}

impl Band {
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Percentage after `done` of `total` units. An empty total fills the band.
    pub fn at(&self, done: u64, total: u64) -> u8 {
        if total == 0 || done >= total {
            return self.end;
        }
        let span = u64::from(self.end.saturating_sub(self.start));
        self.start + (span * done / total) as u8
    }
}

/// Eager mode, processing track.
pub mod eager {
    use super::Band;

    pub const RECEIVED: u8 = 5;
    pub const PROBE_COMPLETE: u8 = 10;
    pub const AUDIO_RESOLVED: u8 = 20;
    /// Label at `AUDIO_RESOLVED` when a track exists but could not be extracted.
    pub const EXTRACTION_FAILED: &str = "Audio extraction failed";
    pub const RECOGNIZED: u8 = 35;
    pub const THUMBNAILS_GENERATED: u8 = 50;
    /// Audio and thumbnails share this band.
    pub const AUX_UPLOAD: Band = Band::new(50, 75);
    pub const VIDEO_UPLOAD: Band = Band::new(75, 95);
    pub const ARTIFACTS_UPLOADED: u8 = 95;
    pub const PERSISTED: u8 = 98;
    pub const CLEANED_UP: u8 = 100;
}

/// Recognition track, both modes.
pub mod recognition {
    use super::Band;

    pub const PROBED: u8 = 20;
    pub const EXTRACTED: u8 = 40;
    /// Deferred mode stores the audio before submitting it.
    pub const AUDIO_UPLOAD: Band = Band::new(40, 60);
    pub const SUBMITTED: u8 = 65;
    pub const IDENTIFIED: u8 = 82;
    pub const DONE: u8 = 100;
}

/// Deferred mode, processing track.
pub mod deferred {
    use super::Band;

    pub const RAW_UPLOAD: Band = Band::new(0, 40);
    pub const PROVISIONAL_PERSISTED: u8 = 45;
    pub const THUMBNAILS_GENERATED: u8 = 55;
    pub const THUMBNAIL_UPLOAD: Band = Band::new(55, 90);
    pub const RECORD_UPDATED: u8 = 95;
    pub const DONE: u8 = 100;
}

struct Published {
    percent: u8,
    label: String,
}

/// Publishes one job's events for one track, never letting the percentage drop.
///
/// Updates are serialized under a lock so concurrent uploads can report
/// through the same tracker; values below the last published one are dropped.
pub struct ProgressTracker {
    bus: ProgressBus,
    channel_id: String,
    job_id: Uuid,
    track: ProgressTrack,
    state: Mutex<TrackerState>,
}

struct TrackerState {
    last: Option<Published>,
    video_id: Option<Uuid>,
}

impl ProgressTracker {
    pub fn new(bus: ProgressBus, channel_id: impl Into<String>, job_id: Uuid, track: ProgressTrack) -> Self {
        Self {
            bus,
            channel_id: channel_id.into(),
            job_id,
            track,
            state: Mutex::new(TrackerState {
                last: None,
                video_id: None,
            }),
        }
    }

    pub fn track(&self) -> ProgressTrack {
        self.track
    }

    /// Attach the record id to every later event.
    pub fn set_video(&self, video_id: Uuid) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.video_id = Some(video_id);
    }

    /// Last published percentage, 0 before anything was published.
    pub fn percent(&self) -> u8 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last.as_ref().map_or(0, |p| p.percent)
    }

    /// Publish a progress update. Returns false when it was dropped for going
    /// backwards or repeating the previous update.
    pub fn advance(&self, percent: u8, label: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(last) = &state.last {
            if percent < last.percent || (percent == last.percent && label == last.label) {
                return false;
            }
        }
        self.publish_locked(&mut state, percent.min(100), label, EventKind::Progress);
        true
    }

    /// Publish a completion notification at `percent` (or the current value if higher).
    pub fn complete(&self, percent: u8, label: &str, kind: EventKind) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let current = state.last.as_ref().map_or(0, |p| p.percent);
        self.publish_locked(&mut state, percent.max(current).min(100), label, kind);
    }

    /// Publish a failure notification at the current percentage.
    pub fn fail(&self, step: Step, message: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let current = state.last.as_ref().map_or(0, |p| p.percent);
        let kind = EventKind::Failed {
            step,
            message: message.to_string(),
        };
        self.publish_locked(&mut state, current, "Processing failed", kind);
    }

    fn publish_locked(&self, state: &mut TrackerState, percent: u8, label: &str, kind: EventKind) {
        let mut event = ProgressEvent::new(
            self.channel_id.clone(),
            self.job_id,
            self.track,
            percent,
            label,
            kind,
        );
        if let Some(video_id) = state.video_id {
            event = event.with_video(video_id);
        }
        self.bus.publish(event);
        state.last = Some(Published {
            percent,
            label: label.to_string(),
        });
    }
}
