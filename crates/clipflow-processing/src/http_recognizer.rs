//! Signed HTTP client for the fingerprint recognition service.
//!
//! Requests are multipart POSTs carrying the audio sample and an HMAC-SHA256
//! signature over the request line, access key and timestamp.

use async_trait::async_trait;
use base64::Engine;
use clipflow_core::RecognitionSettings;
use hmac::{Hmac, Mac};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde_json::Value;
use sha2::Sha256;

use crate::recognition::{RecognitionError, RecognitionResponse, Recognizer};

const DATA_TYPE: &str = "audio";
const SIGNATURE_VERSION: &str = "1";

type HmacSha256 = Hmac<Sha256>;

pub struct HttpRecognizer {
    client: Client,
    endpoint: Url,
    access_key: String,
    access_secret: String,
}

/// String-to-sign: `POST\n{path}\n{access_key}\naudio\n1\n{timestamp}`.
pub fn string_to_sign(path: &str, access_key: &str, timestamp: i64) -> String {
    format!(
        "POST\n{}\n{}\n{}\n{}\n{}",
        path, access_key, DATA_TYPE, SIGNATURE_VERSION, timestamp
    )
}

pub fn sign(secret: &str, message: &str) -> Result<String, RecognitionError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| RecognitionError::Config(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Read `status.code` from a service reply; the whole body becomes the payload.
pub fn parse_response(body: Value) -> Result<RecognitionResponse, RecognitionError> {
    let status_code = body["status"]["code"].as_i64().ok_or_else(|| {
        RecognitionError::InvalidResponse("missing status.code".to_string())
    })?;
    Ok(RecognitionResponse {
        status_code,
        payload: body,
    })
}

impl HttpRecognizer {
    pub fn new(settings: &RecognitionSettings) -> Result<Self, RecognitionError> {
        let endpoint = Url::parse(&settings.endpoint)
            .map_err(|e| RecognitionError::Config(format!("invalid endpoint: {}", e)))?;
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| RecognitionError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            access_key: settings.access_key.clone(),
            access_secret: settings.access_secret.clone(),
        })
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    #[tracing::instrument(skip(self, audio), fields(sample_bytes = audio.len(), endpoint = %self.endpoint))]
    async fn identify(&self, audio: &[u8]) -> Result<RecognitionResponse, RecognitionError> {
        let start = std::time::Instant::now();
        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign(
            &self.access_secret,
            &string_to_sign(self.endpoint.path(), &self.access_key, timestamp),
        )?;

        let sample = Part::bytes(audio.to_vec())
            .file_name("sample")
            .mime_str("application/octet-stream")
            .map_err(|e| RecognitionError::Transport(e.to_string()))?;

        let form = Form::new()
            .part("sample", sample)
            .text("access_key", self.access_key.clone())
            .text("data_type", DATA_TYPE)
            .text("signature_version", SIGNATURE_VERSION)
            .text("signature", signature)
            .text("sample_bytes", audio.len().to_string())
            .text("timestamp", timestamp.to_string());

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| RecognitionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecognitionError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RecognitionError::InvalidResponse(e.to_string()))?;
        let parsed = parse_response(body)?;

        tracing::info!(
            status_code = parsed.status_code,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Recognition request completed"
        );
        Ok(parsed)
    }
}
