//! Clipflow ingestion pipeline
//!
//! Takes a raw uploaded video through probing, audio extraction, music
//! recognition, thumbnail generation, artifact upload, persistence and
//! cleanup, reporting progress on a per-channel event bus.
//!
//! Two modes are offered by [`Orchestrator`]: `run_eager` completes every
//! stage before returning the record, `run_deferred` persists a provisional
//! record after storing the raw upload and finishes the rest in background
//! tasks.

pub mod bus;
pub mod error;
pub mod janitor;
pub mod orchestrator;
pub mod progress;
pub mod scheduler;

pub use bus::{
    BusError, ChannelAuthorizer, JwtChannelAuthorizer, OpenChannels, ProgressBus, Subscription,
};
pub use error::{classify, IngestError, Severity};
pub use janitor::{CleanupReport, Janitor, TransientArtifacts};
pub use orchestrator::{DeferredOutcome, JobHandle, Orchestrator, PipelineServices};
pub use progress::{Band, ProgressTracker};
pub use scheduler::BackgroundScheduler;
