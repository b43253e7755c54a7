use async_trait::async_trait;
use clipflow_processing::{
    RecognitionError, RecognitionResponse, Recognizer, TranscodeError, Transcoder,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Transcoder that writes placeholder files instead of running ffmpeg.
#[derive(Default)]
pub struct ScriptedTranscoder {
    pub has_audio: bool,
    pub duration: Option<f64>,
    pub fail_probe: bool,
    pub fail_extract: bool,
    pub fail_thumbnails: bool,
    /// `generate_thumbnails` never returns.
    pub hang_thumbnails: bool,
    pub extract_calls: AtomicUsize,
}

impl ScriptedTranscoder {
    pub fn with_audio() -> Self {
        Self {
            has_audio: true,
            duration: Some(30.0),
            ..Default::default()
        }
    }

    pub fn silent() -> Self {
        Self {
            has_audio: false,
            duration: Some(30.0),
            ..Default::default()
        }
    }

    fn failure(binary: &str, stderr: &str) -> TranscodeError {
        TranscodeError::ProcessFailed {
            binary: binary.to_string(),
            status: "exit status: 1".to_string(),
            stderr: stderr.to_string(),
        }
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    async fn has_audio_track(&self, video: &Path) -> Result<bool, TranscodeError> {
        if self.fail_probe {
            return Err(Self::failure("ffprobe", "moov atom not found"));
        }
        assert!(video.exists(), "probe ran before the raw video was written");
        Ok(self.has_audio)
    }

    async fn extract_audio(&self, _video: &Path, output: &Path) -> Result<(), TranscodeError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_extract {
            return Err(Self::failure("ffmpeg", "audio codec not supported"));
        }
        tokio::fs::write(output, b"audio-sample").await?;
        Ok(())
    }

    async fn generate_thumbnails(
        &self,
        _video: &Path,
        output_dir: &Path,
        stem: &str,
        count: usize,
    ) -> Result<Vec<PathBuf>, TranscodeError> {
        if self.hang_thumbnails {
            std::future::pending::<()>().await;
        }
        let mut paths = Vec::with_capacity(count);
        for n in 1..=count {
            let path = output_dir.join(format!("{stem}-{n}.png"));
            tokio::fs::write(&path, format!("png-{n}")).await?;
            paths.push(path);
            if self.fail_thumbnails {
                return Err(Self::failure("ffmpeg", "frame decode error"));
            }
        }
        Ok(paths)
    }

    async fn probe_duration(&self, _video: &Path) -> Result<Option<f64>, TranscodeError> {
        Ok(self.duration)
    }
}

pub enum Script {
    Respond { status_code: i64, payload: Value },
    TransportError,
    /// `identify` never returns.
    Hang,
}

/// Recognizer with a canned answer and a call counter.
pub struct ScriptedRecognizer {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn identify(&self, audio: &[u8]) -> Result<RecognitionResponse, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!audio.is_empty(), "empty audio sample submitted");
        match &self.script {
            Script::Respond {
                status_code,
                payload,
            } => Ok(RecognitionResponse {
                status_code: *status_code,
                payload: payload.clone(),
            }),
            Script::TransportError => Err(RecognitionError::Transport(
                "connection reset by peer".to_string(),
            )),
            Script::Hang => std::future::pending().await,
        }
    }
}
