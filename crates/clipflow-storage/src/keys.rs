//! Shared key generation for storage backends.
//!
//! Key format: `{folder}/{file_name}` where the folder is chosen by artifact kind.

use clipflow_core::constants::{AUDIO_FOLDER, THUMBNAIL_FOLDER, VIDEO_FOLDER};

use crate::traits::{StorageError, StorageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Video,
    Audio,
    Thumbnail,
}

impl ArtifactKind {
    pub fn folder(&self) -> &'static str {
        match self {
            ArtifactKind::Video => VIDEO_FOLDER,
            ArtifactKind::Audio => AUDIO_FOLDER,
            ArtifactKind::Thumbnail => THUMBNAIL_FOLDER,
        }
    }
}

/// Generate a storage key for an artifact file name.
pub fn artifact_key(kind: ArtifactKind, file_name: &str) -> String {
    format!("{}/{}", kind.folder(), file_name)
}

/// Reject keys that could escape a backend's root.
pub fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty() || storage_key.contains("..") || storage_key.starts_with('/') {
        return Err(StorageError::InvalidKey(storage_key.to_string()));
    }
    Ok(())
}

/// MIME type guessed from the key's extension.
pub fn content_type_for(storage_key: &str) -> &'static str {
    let ext = storage_key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "aac" | "m4a" => "audio/aac",
        "wav" => "audio/wav",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
