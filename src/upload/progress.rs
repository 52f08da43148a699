//! Upload progress
//!
//! Aggregate progress is recomputed by the coordinator after every part
//! state change; per-part byte progress is reported by the transport while
//! an individual transfer runs.

use super::session::SessionState;
use serde::Serialize;
use std::sync::Arc;

/// Aggregate progress of one upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub completed_bytes: u64,
    pub total_bytes: u64,
    pub completed_parts: u32,
    pub total_parts: u32,
    pub state: SessionState,
}

impl UploadProgress {
    /// Progress before anything is known about the upload
    pub fn empty() -> Self {
        Self {
            completed_bytes: 0,
            total_bytes: 0,
            completed_parts: 0,
            total_parts: 0,
            state: SessionState::Init,
        }
    }

    /// `completed_bytes / total_bytes`, in `[0.0, 1.0]`
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.completed_bytes as f64 / self.total_bytes as f64).min(1.0)
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }
}

/// Byte-level progress of a single part transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartProgress {
    pub part_number: u32,
    pub bytes_sent: u64,
    pub part_bytes: u64,
}

/// Callback invoked with per-part byte progress
pub type PartProgressCallback = Arc<dyn Fn(PartProgress) + Send + Sync>;

/// Callback that ignores every event
pub fn no_part_progress() -> PartProgressCallback {
    Arc::new(|_| {})
}
