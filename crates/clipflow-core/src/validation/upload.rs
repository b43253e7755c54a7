//! Upload validation and transient file naming.

use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::models::UploadRequest;

const RANDOM_SUFFIX_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("upload is empty")]
    EmptyUpload,
    #[error("upload has no file name")]
    MissingFileName,
    #[error("file name '{0}' has no extension")]
    MissingExtension(String),
    #[error("extension '{extension}' is not allowed (allowed: {allowed})")]
    ExtensionNotAllowed { extension: String, allowed: String },
    #[error("upload of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    #[error("{0} must not be empty")]
    MissingField(&'static str),
}

/// Limits applied to every upload before the pipeline starts.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_size_bytes: usize,
    /// Lowercase extensions without the leading dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_size_bytes: 500 * 1024 * 1024,
            allowed_extensions: ["mp4", "mov", "webm", "mkv", "avi"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// A collision-resistant transient name for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedName {
    /// Sanitized stem plus owner, timestamp and random suffix; no extension.
    pub stem: String,
    /// Lowercase extension without the dot.
    pub extension: String,
}

impl EncodedName {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem, self.extension)
    }

    /// Same stem with a different extension, for derived artifacts.
    pub fn with_extension(&self, extension: &str) -> String {
        format!("{}.{}", self.stem, extension)
    }
}

/// Split `my.clip.mp4` into (`my.clip`, `mp4`). The extension is `None` when
/// the name has no dot or ends with one.
pub fn split_title_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rsplit_once('.') {
        Some((title, ext)) if !title.is_empty() && !ext.is_empty() => (title, Some(ext)),
        _ => (file_name, None),
    }
}

/// Lowercase and replace every character outside `[a-z0-9]` with `_`.
pub fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn encode_file_name(
    file_name: &str,
    owner_id: &str,
    at: DateTime<Utc>,
) -> Result<EncodedName, ValidationError> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(ValidationError::MissingFileName);
    }
    let (stem, extension) = split_title_extension(file_name);
    let extension = extension
        .ok_or_else(|| ValidationError::MissingExtension(file_name.to_string()))?
        .to_lowercase();

    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();

    Ok(EncodedName {
        stem: format!(
            "{}_{}_{}_{}",
            sanitize_stem(stem),
            sanitize_stem(owner_id),
            at.timestamp_millis(),
            suffix
        ),
        extension,
    })
}

pub fn validate_upload(
    upload: &UploadRequest,
    limits: &UploadLimits,
) -> Result<(), ValidationError> {
    if upload.owner_id.trim().is_empty() {
        return Err(ValidationError::MissingField("owner_id"));
    }
    if upload.channel_id.trim().is_empty() {
        return Err(ValidationError::MissingField("channel_id"));
    }
    if upload.file_name.trim().is_empty() {
        return Err(ValidationError::MissingFileName);
    }
    if upload.data.is_empty() {
        return Err(ValidationError::EmptyUpload);
    }
    if upload.data.len() > limits.max_size_bytes {
        return Err(ValidationError::TooLarge {
            size: upload.data.len(),
            max: limits.max_size_bytes,
        });
    }

    let (_, extension) = split_title_extension(upload.file_name.trim());
    let extension = extension
        .ok_or_else(|| ValidationError::MissingExtension(upload.file_name.clone()))?
        .to_lowercase();
    if !limits.allowed_extensions.iter().any(|e| *e == extension) {
        return Err(ValidationError::ExtensionNotAllowed {
            extension,
            allowed: limits.allowed_extensions.join(","),
        });
    }
    Ok(())
}
