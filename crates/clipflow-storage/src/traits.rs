//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked object body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Storage abstraction trait
///
/// Blobs are opaque bytes addressed by string keys (see the crate root for the
/// layout). Backends hold no per-job state.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Like `put`, calling `progress(sent, total)` as bytes are committed.
    ///
    /// Backends that cannot report partial progress report completion once.
    async fn put_with_progress(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        progress: &(dyn Fn(u64, u64) + Send + Sync),
    ) -> StorageResult<()> {
        let total = data.len() as u64;
        self.put(key, data, content_type).await?;
        progress(total, total);
        Ok(())
    }

    /// Open an object as a stream of chunks.
    async fn get(&self, key: &str) -> StorageResult<ByteStream>;

    /// Read a whole object into memory.
    async fn download(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Temporary URL granting read access to the object.
    async fn signed_url(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Size in bytes of a stored object.
    async fn content_length(&self, key: &str) -> StorageResult<u64>;

    fn backend_type(&self) -> StorageBackend;
}
