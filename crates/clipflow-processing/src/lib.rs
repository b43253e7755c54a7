//! Clipflow Processing Library
//!
//! Adapters for the external media services the ingestion pipeline drives:
//!
//! - **Transcoding**: track probing, audio extraction and thumbnail rendering
//!   through ffmpeg/ffprobe (`Transcoder`, `FFmpegTranscoder`)
//! - **Recognition**: background-music identification through a signed HTTP
//!   fingerprint service (`Recognizer`, `HttpRecognizer`)

pub mod ffmpeg;
pub mod http_recognizer;
pub mod recognition;
pub mod transcoder;

pub use ffmpeg::FFmpegTranscoder;
pub use http_recognizer::HttpRecognizer;
pub use recognition::{RecognitionError, RecognitionResponse, Recognizer};
pub use transcoder::{TranscodeError, Transcoder};
