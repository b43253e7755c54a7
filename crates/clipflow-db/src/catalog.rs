//! Read/write facade over the record store and the artifact store.

use clipflow_core::models::{VideoDraft, VideoPatch, VideoRecord};
use clipflow_storage::Storage;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::db::VideoRecordStore;
use crate::error::PersistenceError;

/// What readers get instead of raw storage keys.
#[derive(Debug, Clone, Serialize)]
pub struct SignedVideoView {
    pub id: Uuid,
    pub title: String,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
}

#[derive(Clone)]
pub struct VideoCatalog {
    store: Arc<dyn VideoRecordStore>,
    storage: Arc<dyn Storage>,
}

impl VideoCatalog {
    pub fn new(store: Arc<dyn VideoRecordStore>, storage: Arc<dyn Storage>) -> Self {
        Self { store, storage }
    }

    /// Create or refresh the record for `draft.video_key`.
    ///
    /// The size comes from the stored blob; if it cannot be read the call
    /// fails with `SizeUnavailable` and nothing is written.
    #[tracing::instrument(skip(self, draft), fields(video_key = %draft.video_key))]
    pub async fn create(&self, draft: VideoDraft) -> Result<VideoRecord, PersistenceError> {
        let key = draft.video_key.clone();
        let size = self.storage.content_length(&key).await.map_err(|e| {
            PersistenceError::SizeUnavailable {
                key: key.clone(),
                reason: e.to_string(),
            }
        })?;
        let size = i64::try_from(size).map_err(|_| PersistenceError::SizeUnavailable {
            key: key.clone(),
            reason: format!("{} bytes is out of range", size),
        })?;

        let (record, created) = self.store.upsert_by_key(draft, size).await?;
        tracing::info!(
            video_id = %record.id,
            size_bytes = size,
            created,
            "Video record persisted"
        );
        Ok(record)
    }

    pub async fn update(&self, id: Uuid, patch: VideoPatch) -> Result<VideoRecord, PersistenceError> {
        self.store.update(id, patch).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<VideoRecord>, PersistenceError> {
        self.store.get(id).await
    }

    pub async fn get_by_key(&self, video_key: &str) -> Result<Option<VideoRecord>, PersistenceError> {
        self.store.get_by_key(video_key).await
    }

    /// Make the `index`-th generated candidate the primary thumbnail.
    pub async fn select_thumbnail(
        &self,
        id: Uuid,
        index: usize,
    ) -> Result<VideoRecord, PersistenceError> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or(PersistenceError::NotFound(id))?;
        let key = record.thumbnail_keys.get(index).cloned().ok_or(
            PersistenceError::ThumbnailIndex {
                index,
                available: record.thumbnail_keys.len(),
            },
        )?;
        self.store
            .update(
                id,
                VideoPatch {
                    primary_thumbnail_key: Some(key),
                    ..Default::default()
                },
            )
            .await
    }

    pub async fn signed_view(
        &self,
        record: &VideoRecord,
        ttl: Duration,
    ) -> Result<SignedVideoView, PersistenceError> {
        let video_url = self.storage.signed_url(&record.video_key, ttl).await?;
        let thumbnail_url = match &record.primary_thumbnail_key {
            Some(key) => Some(self.storage.signed_url(key, ttl).await?),
            None => None,
        };
        Ok(SignedVideoView {
            id: record.id,
            title: record.title.clone(),
            video_url,
            thumbnail_url,
        })
    }
}
