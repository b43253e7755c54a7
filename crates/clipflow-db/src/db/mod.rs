//! Record store implementations.
//!
//! `PgVideoRepository` is used in production; `InMemoryVideoRepository`
//! backs local runs without `DATABASE_URL` and tests.

pub mod memory;
pub mod video;

pub use memory::InMemoryVideoRepository;
pub use video::PgVideoRepository;

use async_trait::async_trait;
use clipflow_core::models::{VideoDraft, VideoPatch, VideoRecord};
use uuid::Uuid;

use crate::error::PersistenceError;

#[async_trait]
pub trait VideoRecordStore: Send + Sync {
    /// Insert a record for `draft.video_key`, or overwrite the draft fields of
    /// the existing one. Returns the record and whether it was newly created.
    ///
    /// Identity, visibility and creation time of an existing record are kept.
    async fn upsert_by_key(
        &self,
        draft: VideoDraft,
        size_bytes: i64,
    ) -> Result<(VideoRecord, bool), PersistenceError>;

    async fn update(&self, id: Uuid, patch: VideoPatch) -> Result<VideoRecord, PersistenceError>;

    async fn get(&self, id: Uuid) -> Result<Option<VideoRecord>, PersistenceError>;

    async fn get_by_key(&self, video_key: &str) -> Result<Option<VideoRecord>, PersistenceError>;
}
