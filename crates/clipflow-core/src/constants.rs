//! Shared constants.

/// Status code the recognition service returns for a successful lookup.
pub const RECOGNITION_SUCCESS: i64 = 0;

/// Folder prefixes for derived artifacts, both in the work dir and in the object store.
pub const VIDEO_FOLDER: &str = "videos";
pub const AUDIO_FOLDER: &str = "audios";
pub const THUMBNAIL_FOLDER: &str = "thumbnails";

pub const DEFAULT_THUMBNAIL_COUNT: usize = 3;
pub const DEFAULT_THUMBNAIL_SIZE: &str = "1280x720";
pub const DEFAULT_AUDIO_FORMAT: &str = "mp3";

/// Default lifetime of signed URLs handed to readers (15 minutes).
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 900;

/// Upper bound on a single persistence retry delay.
pub const MAX_PERSIST_BACKOFF_MS: u64 = 30_000;
