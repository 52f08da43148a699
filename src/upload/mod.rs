//! Upload module
//!
//! Resumable, concurrent multipart uploads: planning, the coordinator's
//! scheduling loop, and the completion/abort protocol.

use crate::backend::RequestError;
use thiserror::Error;

pub mod coordinator;
pub mod finalize;
pub mod planner;
pub mod progress;
pub mod retry;
pub mod session;
pub mod source;

pub use coordinator::{CancelHandle, CoordinatorOptions, UploadCoordinator, UploadFile};
pub use planner::{compute_parts, DeviceClass, PartPlan};
pub use progress::{PartProgress, UploadProgress};
pub use retry::RetryPolicy;
pub use session::{PartRecord, PartState, SessionState, UploadSession};
pub use source::{ByteSource, FileSource, MemorySource};

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Init failed: {0}")]
    Init(RequestError),

    #[error("Part {part_number} failed after {attempts} attempt(s): {source}")]
    Part {
        part_number: u32,
        attempts: u32,
        #[source]
        source: RequestError,
    },

    #[error("Completion failed: {0}")]
    Completion(RequestError),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Refusing to upload an empty file")]
    EmptyFile,

    #[error("No upload session; call initialize first")]
    NoSession,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid part list: {0}")]
    InvalidPartList(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker failed: {0}")]
    Worker(String),
}

impl UploadError {
    /// The underlying request error, if any
    pub fn request_error(&self) -> Option<&RequestError> {
        match self {
            UploadError::Init(e) | UploadError::Completion(e) => Some(e),
            UploadError::Part { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Successful upload outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    pub locator: String,
    pub upload_id: String,
    pub object_key: String,
    pub part_count: u32,
    pub bytes: u64,
}

/// Failed upload outcome with the last known progress
#[derive(Error, Debug)]
#[error("{error} ({:.1}% uploaded)", .progress.percent())]
pub struct UploadFailure {
    #[source]
    pub error: UploadError,
    pub progress: UploadProgress,
}

impl UploadFailure {
    pub fn new(error: UploadError, progress: UploadProgress) -> Self {
        Self { error, progress }
    }

    /// Whether the upload ended because the caller cancelled it
    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, UploadError::Cancelled)
    }
}
