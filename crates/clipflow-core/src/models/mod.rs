pub mod job;
pub mod progress;
pub mod upload;
pub mod video;

pub use job::{IngestionJob, Stage, Step, TransitionError};
pub use progress::{EventKind, ProgressEvent, ProgressTrack};
pub use upload::UploadRequest;
pub use video::{
    ProcessingStatus, RecognitionOutcome, VideoDraft, VideoPatch, VideoRecord, Visibility,
};
