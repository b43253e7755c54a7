//! Clipflow Storage Library
//!
//! Artifact store client used by the ingestion pipeline. It includes the
//! `Storage` trait and implementations for S3 and the local filesystem.
//!
//! # Storage key format
//!
//! Keys are grouped by artifact kind:
//!
//! - **Videos**: `videos/{file_name}`
//! - **Audio**: `audios/{file_name}`
//! - **Thumbnails**: `thumbnails/{file_name}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized in the
//! `keys` module so the pipeline's work dir and every backend stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use clipflow_core::StorageBackend;
pub use factory::create_storage;
pub use keys::{artifact_key, content_type_for, validate_key, ArtifactKind};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
