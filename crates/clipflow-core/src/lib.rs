//! Clipflow Core Library
//!
//! This crate provides the domain models, configuration, constants and upload
//! validation shared by every clipflow component: the storage client, the
//! transcoding/recognition adapters, metadata persistence and the pipeline.

pub mod config;
pub mod constants;
pub mod models;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{
    DatabaseSettings, IngestConfig, PipelineSettings, RecognitionSettings, StorageSettings,
    TranscoderSettings,
};
pub use storage_types::StorageBackend;
pub use validation::ValidationError;
