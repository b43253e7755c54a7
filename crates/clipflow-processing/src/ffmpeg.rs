//! ffmpeg/ffprobe backed transcoder.

use async_trait::async_trait;
use clipflow_core::TranscoderSettings;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::transcoder::{TranscodeError, Transcoder};

/// Validate that a path doesn't contain shell metacharacters or dangerous sequences
fn validate_path(path: &str) -> Result<(), TranscodeError> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(TranscodeError::InvalidPath(format!(
            "contains dangerous characters: {}",
            path
        )));
    }

    if path.contains("..") {
        return Err(TranscodeError::InvalidPath(format!(
            "contains directory traversal: {}",
            path
        )));
    }

    Ok(())
}

fn validate_binary(path: &str) -> Result<(), TranscodeError> {
    validate_path(path)?;
    if path.is_empty()
        || !path
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '\\'))
    {
        return Err(TranscodeError::InvalidPath(format!(
            "unsafe binary path: {}",
            path
        )));
    }
    Ok(())
}

/// Whether ffprobe's `-show_streams` JSON lists an audio stream.
pub fn probe_has_audio(probe: &Value) -> bool {
    probe["streams"]
        .as_array()
        .map(|streams| {
            streams
                .iter()
                .any(|s| s["codec_type"].as_str() == Some("audio"))
        })
        .unwrap_or(false)
}

/// `format.duration` from ffprobe JSON (reported as a string).
pub fn probe_duration_secs(probe: &Value) -> Option<f64> {
    let duration = &probe["format"]["duration"];
    duration
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| duration.as_f64())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Evenly spaced capture offsets: 3 frames land at 20%, 40% and 60% of the clip.
/// Without a duration, frames are taken one second apart from the start.
pub fn thumbnail_offsets(duration: Option<f64>, count: usize) -> Vec<f64> {
    match duration {
        Some(duration) => (1..=count)
            .map(|i| duration * i as f64 / (count + 2) as f64)
            .collect(),
        None => (0..count).map(|i| i as f64).collect(),
    }
}

fn audio_codec_for(output: &Path) -> &'static str {
    match output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("aac") | Some("m4a") => "aac",
        Some("wav") => "pcm_s16le",
        Some("ogg") => "libvorbis",
        Some("flac") => "flac",
        _ => "libmp3lame",
    }
}

#[derive(Debug, Clone)]
pub struct FFmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    thumbnail_size: String,
}

impl FFmpegTranscoder {
    pub fn new(settings: &TranscoderSettings) -> Result<Self, TranscodeError> {
        validate_binary(&settings.ffmpeg_path)?;
        validate_binary(&settings.ffprobe_path)?;
        Ok(Self {
            ffmpeg_path: settings.ffmpeg_path.clone(),
            ffprobe_path: settings.ffprobe_path.clone(),
            thumbnail_size: settings.thumbnail_size.clone(),
        })
    }

    async fn run(&self, binary: &str, args: &[String]) -> Result<Vec<u8>, TranscodeError> {
        let output = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                binary: binary.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(TranscodeError::ProcessFailed {
                binary: binary.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn probe(&self, video: &Path) -> Result<Value, TranscodeError> {
        let path = video.to_string_lossy().to_string();
        validate_path(&path)?;
        let args: Vec<String> = [
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(path))
        .collect();

        let stdout = self.run(&self.ffprobe_path, &args).await?;
        serde_json::from_slice(&stdout).map_err(|e| TranscodeError::Probe(e.to_string()))
    }
}

#[async_trait]
impl Transcoder for FFmpegTranscoder {
    #[tracing::instrument(skip(self), fields(ffmpeg.operation = "probe_audio"))]
    async fn has_audio_track(&self, video: &Path) -> Result<bool, TranscodeError> {
        let probe = self.probe(video).await?;
        let has_audio = probe_has_audio(&probe);
        tracing::debug!(has_audio, "Probed audio tracks");
        Ok(has_audio)
    }

    #[tracing::instrument(skip(self), fields(ffmpeg.operation = "extract_audio"))]
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<(), TranscodeError> {
        let start = std::time::Instant::now();
        let input = video.to_string_lossy().to_string();
        let target = output.to_string_lossy().to_string();
        validate_path(&input)?;
        validate_path(&target)?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input,
            "-vn".to_string(),
            "-acodec".to_string(),
            audio_codec_for(output).to_string(),
            target,
        ];
        self.run(&self.ffmpeg_path, &args).await?;

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(TranscodeError::NoOutput(output.display().to_string()));
        }

        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Audio extraction completed"
        );
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(ffmpeg.operation = "thumbnails"))]
    async fn generate_thumbnails(
        &self,
        video: &Path,
        output_dir: &Path,
        stem: &str,
        count: usize,
    ) -> Result<Vec<PathBuf>, TranscodeError> {
        let start = std::time::Instant::now();
        let input = video.to_string_lossy().to_string();
        validate_path(&input)?;
        validate_path(stem)?;
        tokio::fs::create_dir_all(output_dir).await?;

        let duration = self.probe_duration(video).await?;
        let mut thumbnails = Vec::with_capacity(count);

        for (index, offset) in thumbnail_offsets(duration, count).into_iter().enumerate() {
            let output = output_dir.join(format!("{}-{}.png", stem, index + 1));
            let args = vec![
                "-y".to_string(),
                "-ss".to_string(),
                format!("{:.3}", offset),
                "-i".to_string(),
                input.clone(),
                "-frames:v".to_string(),
                "1".to_string(),
                "-s".to_string(),
                self.thumbnail_size.clone(),
                output.to_string_lossy().to_string(),
            ];
            self.run(&self.ffmpeg_path, &args).await?;

            if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
                return Err(TranscodeError::NoOutput(output.display().to_string()));
            }
            thumbnails.push(output);
        }

        tracing::info!(
            count = thumbnails.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Thumbnail generation completed"
        );
        Ok(thumbnails)
    }

    async fn probe_duration(&self, video: &Path) -> Result<Option<f64>, TranscodeError> {
        let probe = self.probe(video).await?;
        Ok(probe_duration_secs(&probe))
    }
}
