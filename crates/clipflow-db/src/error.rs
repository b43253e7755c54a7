use clipflow_storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("video record {0} not found")]
    NotFound(Uuid),

    #[error("size of stored artifact {key} could not be determined: {reason}")]
    SizeUnavailable { key: String, reason: String },

    #[error("thumbnail index {index} out of range ({available} candidates)")]
    ThumbnailIndex { index: usize, available: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PersistenceError {
    /// Whether repeating the same write might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PersistenceError::Database(e) => !matches!(
                e,
                sqlx::Error::RowNotFound
                    | sqlx::Error::ColumnNotFound(_)
                    | sqlx::Error::ColumnDecode { .. }
                    | sqlx::Error::TypeNotFound { .. }
            ),
            PersistenceError::SizeUnavailable { .. } | PersistenceError::Storage(_) => true,
            PersistenceError::NotFound(_)
            | PersistenceError::ThumbnailIndex { .. }
            | PersistenceError::Migration(_) => false,
        }
    }
}
