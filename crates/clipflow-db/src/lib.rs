//! Metadata persistence for video records.
//!
//! The record store is the single source of truth read outside the pipeline.
//! Every write is keyed by the video's primary storage key, so re-running a
//! job's persist step never produces a second record.

pub mod catalog;
pub mod db;
pub mod error;
pub mod setup;

pub use catalog::{SignedVideoView, VideoCatalog};
pub use db::{InMemoryVideoRepository, PgVideoRepository, VideoRecordStore};
pub use error::PersistenceError;
pub use setup::{connect, create_record_store, run_migrations};
