use async_trait::async_trait;
use bytes::Bytes;
use clipflow_storage::{ByteStream, Storage, StorageBackend, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Object store kept in memory. Uploads can be made to fail.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_uploads: Arc<AtomicBool>,
    hide_sizes: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_uploads() -> Self {
        let storage = Self::new();
        storage.fail_uploads.store(true, Ordering::SeqCst);
        storage
    }

    /// Uploads succeed but `content_length` always reports NotFound.
    pub fn without_sizes() -> Self {
        let storage = Self::new();
        storage.hide_sizes.store(true, Ordering::SeqCst);
        storage
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::UploadFailed(format!("{key}: injected failure")));
        }
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn put_with_progress(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        progress: &(dyn Fn(u64, u64) + Send + Sync),
    ) -> StorageResult<()> {
        let total = data.len() as u64;
        progress(total / 2, total);
        self.put(key, data, content_type).await?;
        progress(total, total);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<ByteStream> {
        let data = self.download(key).await?;
        Ok(Box::pin(futures::stream::once(async move {
            Ok(Bytes::from(data))
        })))
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        Ok(format!("memory://{}?expires_in={}", key, expires_in.as_secs()))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.contains(key))
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        if self.hide_sizes.load(Ordering::SeqCst) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|data| data.len() as u64)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
