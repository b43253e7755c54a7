//! Video record repository: CRUD for the videos table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clipflow_core::models::{
    ProcessingStatus, RecognitionOutcome, VideoDraft, VideoPatch, VideoRecord, Visibility,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::VideoRecordStore;
use crate::error::PersistenceError;

const VIDEO_COLUMNS: &str = "id, video_key, owner_id, channel_id, title, description, tags, \
     duration, size_bytes, visibility, processing_status, recognition, audio_key, \
     thumbnail_keys, primary_thumbnail_key, created_at, updated_at";

/// Row type for the videos table.
#[derive(Debug, sqlx::FromRow)]
pub struct VideoRow {
    pub id: Uuid,
    pub video_key: String,
    pub owner_id: String,
    pub channel_id: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub duration: Option<f64>,
    pub size_bytes: i64,
    pub visibility: Visibility,
    pub processing_status: ProcessingStatus,
    pub recognition: Option<Json<RecognitionOutcome>>,
    pub audio_key: Option<String>,
    pub thumbnail_keys: Vec<String>,
    pub primary_thumbnail_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoRow {
    pub fn into_record(self) -> VideoRecord {
        VideoRecord {
            id: self.id,
            video_key: self.video_key,
            owner_id: self.owner_id,
            channel_id: self.channel_id,
            title: self.title,
            description: self.description,
            tags: self.tags,
            duration: self.duration,
            size_bytes: self.size_bytes,
            visibility: self.visibility,
            processing_status: self.processing_status,
            recognition: self.recognition.map(|r| r.0),
            audio_key: self.audio_key,
            thumbnail_keys: self.thumbnail_keys,
            primary_thumbnail_key: self.primary_thumbnail_key,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    row: VideoRow,
    inserted: bool,
}

/// Repository for the videos table.
#[derive(Clone)]
pub struct PgVideoRepository {
    pool: PgPool,
}

impl PgVideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoRecordStore for PgVideoRepository {
    #[tracing::instrument(skip(self, draft), fields(db.table = "videos", video_key = %draft.video_key))]
    async fn upsert_by_key(
        &self,
        draft: VideoDraft,
        size_bytes: i64,
    ) -> Result<(VideoRecord, bool), PersistenceError> {
        let primary_thumbnail_key = draft
            .primary_thumbnail_key
            .clone()
            .or_else(|| draft.thumbnail_keys.first().cloned());

        // xmax is 0 only for rows written by a fresh INSERT.
        let query = format!(
            r#"
            INSERT INTO videos (
                id, video_key, owner_id, channel_id, title, description, tags, duration,
                size_bytes, visibility, processing_status, recognition, audio_key,
                thumbnail_keys, primary_thumbnail_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (video_key) DO UPDATE SET
                owner_id = EXCLUDED.owner_id,
                channel_id = EXCLUDED.channel_id,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                tags = EXCLUDED.tags,
                duration = EXCLUDED.duration,
                size_bytes = EXCLUDED.size_bytes,
                processing_status = EXCLUDED.processing_status,
                recognition = EXCLUDED.recognition,
                audio_key = EXCLUDED.audio_key,
                thumbnail_keys = EXCLUDED.thumbnail_keys,
                primary_thumbnail_key = EXCLUDED.primary_thumbnail_key,
                updated_at = NOW()
            RETURNING {VIDEO_COLUMNS}, (xmax = 0) AS inserted
            "#
        );

        let upserted: UpsertRow = sqlx::query_as::<Postgres, UpsertRow>(&query)
            .bind(Uuid::new_v4())
            .bind(&draft.video_key)
            .bind(&draft.owner_id)
            .bind(&draft.channel_id)
            .bind(&draft.title)
            .bind(&draft.description)
            .bind(&draft.tags)
            .bind(draft.duration)
            .bind(size_bytes)
            .bind(Visibility::Private)
            .bind(draft.processing_status)
            .bind(draft.recognition.map(Json))
            .bind(&draft.audio_key)
            .bind(&draft.thumbnail_keys)
            .bind(primary_thumbnail_key)
            .fetch_one(&self.pool)
            .await?;

        tracing::debug!(
            video_id = %upserted.row.id,
            created = upserted.inserted,
            "Video record upserted"
        );

        Ok((upserted.row.into_record(), upserted.inserted))
    }

    #[tracing::instrument(skip(self, patch), fields(db.table = "videos", db.record_id = %id))]
    async fn update(&self, id: Uuid, patch: VideoPatch) -> Result<VideoRecord, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<VideoRow> = sqlx::query_as::<Postgres, VideoRow>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut record = row.ok_or(PersistenceError::NotFound(id))?.into_record();
        record.apply_patch(patch);

        let row: VideoRow = sqlx::query_as::<Postgres, VideoRow>(&format!(
            r#"
            UPDATE videos SET
                title = $2,
                description = $3,
                tags = $4,
                duration = $5,
                visibility = $6,
                processing_status = $7,
                recognition = $8,
                audio_key = $9,
                thumbnail_keys = $10,
                primary_thumbnail_key = $11,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {VIDEO_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.tags)
        .bind(record.duration)
        .bind(record.visibility)
        .bind(record.processing_status)
        .bind(record.recognition.clone().map(Json))
        .bind(&record.audio_key)
        .bind(&record.thumbnail_keys)
        .bind(&record.primary_thumbnail_key)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into_record())
    }

    #[tracing::instrument(skip(self), fields(db.table = "videos", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<VideoRecord>, PersistenceError> {
        let row: Option<VideoRow> = sqlx::query_as::<Postgres, VideoRow>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(VideoRow::into_record))
    }

    #[tracing::instrument(skip(self), fields(db.table = "videos"))]
    async fn get_by_key(&self, video_key: &str) -> Result<Option<VideoRecord>, PersistenceError> {
        let row: Option<VideoRow> = sqlx::query_as::<Postgres, VideoRow>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE video_key = $1"
        ))
        .bind(video_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(VideoRow::into_record))
    }
}
