use async_trait::async_trait;
use clipflow_core::models::{VideoDraft, VideoPatch, VideoRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::VideoRecordStore;
use crate::error::PersistenceError;

#[derive(Default)]
struct Records {
    by_id: HashMap<Uuid, VideoRecord>,
    id_by_key: HashMap<String, Uuid>,
}

/// Process-local record store.
#[derive(Clone, Default)]
pub struct InMemoryVideoRepository {
    records: Arc<RwLock<Records>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn all(&self) -> Vec<VideoRecord> {
        self.records.read().await.by_id.values().cloned().collect()
    }
}

#[async_trait]
impl VideoRecordStore for InMemoryVideoRepository {
    async fn upsert_by_key(
        &self,
        draft: VideoDraft,
        size_bytes: i64,
    ) -> Result<(VideoRecord, bool), PersistenceError> {
        let mut records = self.records.write().await;
        if let Some(id) = records.id_by_key.get(&draft.video_key).copied() {
            if let Some(existing) = records.by_id.get_mut(&id) {
                existing.merge_draft(draft, size_bytes);
                return Ok((existing.clone(), false));
            }
        }

        let record = VideoRecord::from_draft(draft, size_bytes);
        records
            .id_by_key
            .insert(record.video_key.clone(), record.id);
        records.by_id.insert(record.id, record.clone());
        Ok((record, true))
    }

    async fn update(&self, id: Uuid, patch: VideoPatch) -> Result<VideoRecord, PersistenceError> {
        let mut records = self.records.write().await;
        let record = records
            .by_id
            .get_mut(&id)
            .ok_or(PersistenceError::NotFound(id))?;
        record.apply_patch(patch);
        Ok(record.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<VideoRecord>, PersistenceError> {
        Ok(self.records.read().await.by_id.get(&id).cloned())
    }

    async fn get_by_key(&self, video_key: &str) -> Result<Option<VideoRecord>, PersistenceError> {
        let records = self.records.read().await;
        Ok(records
            .id_by_key
            .get(video_key)
            .and_then(|id| records.by_id.get(id))
            .cloned())
    }
}
