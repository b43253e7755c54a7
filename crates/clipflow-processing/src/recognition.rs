//! Music recognition service contract.

use async_trait::async_trait;
use clipflow_core::constants::RECOGNITION_SUCCESS;
use clipflow_core::models::RecognitionOutcome;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recognition request failed: {0}")]
    Transport(String),

    #[error("recognition service returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("unreadable recognition response: {0}")]
    InvalidResponse(String),

    #[error("recognition client misconfigured: {0}")]
    Config(String),
}

/// Raw reply of the fingerprint service.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResponse {
    pub status_code: i64,
    pub payload: Value,
}

impl RecognitionResponse {
    pub fn is_success(&self) -> bool {
        self.status_code == RECOGNITION_SUCCESS
    }

    pub fn into_outcome(self) -> RecognitionOutcome {
        RecognitionOutcome::from_status(self.status_code, self.payload)
    }
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Submit an audio sample for identification.
    async fn identify(&self, audio: &[u8]) -> Result<RecognitionResponse, RecognitionError>;
}
