//! Database connection and record store selection.

use clipflow_core::DatabaseSettings;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::db::{InMemoryVideoRepository, PgVideoRepository, VideoRecordStore};
use crate::error::PersistenceError;

pub async fn connect(url: &str, settings: &DatabaseSettings) -> Result<PgPool, PersistenceError> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(settings.timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(url)
        .await?;

    tracing::info!(
        max_connections = settings.max_connections,
        "Database connected successfully"
    );
    Ok(pool)
}

/// Apply the embedded migrations in `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), PersistenceError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// PostgreSQL when a URL is configured, otherwise a process-local store.
pub async fn create_record_store(
    settings: &DatabaseSettings,
) -> Result<Arc<dyn VideoRecordStore>, PersistenceError> {
    match &settings.url {
        Some(url) => {
            let pool = connect(url, settings).await?;
            run_migrations(&pool).await?;
            Ok(Arc::new(PgVideoRepository::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; video records are kept in memory");
            Ok(Arc::new(InMemoryVideoRepository::new()))
        }
    }
}
