//! Upload session model
//!
//! An [`UploadSession`] is one transfer attempt against the backend. Its
//! lifecycle:
//!
//! ```text
//! INIT -> UPLOADING -> COMPLETING -> DONE
//!              |             \
//!              |              -> FAILED
//!              -> ABORTING -> ABORTED
//!              |          \
//!              |           -> FAILED
//!              -> FAILED
//! ```
//!
//! Only `INIT` and `UPLOADING` can be resumed.

use super::planner::PartPlan;
use super::UploadError;
use crate::resume::FileFingerprint;
use crate::transport::ByteRange;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Lifecycle state of an upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Init,
    Uploading,
    Completing,
    Done,
    Aborting,
    Aborted,
    Failed,
}

impl SessionState {
    /// Whether `start()` may (re-)enter this state
    pub fn is_resumable(self) -> bool {
        matches!(self, SessionState::Init | SessionState::Uploading)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Done | SessionState::Aborted | SessionState::Failed
        )
    }

    fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Init, Uploading)
                | (Init, Aborting)
                | (Uploading, Uploading)
                | (Uploading, Completing)
                | (Uploading, Aborting)
                | (Uploading, Failed)
                | (Completing, Done)
                | (Completing, Failed)
                | (Aborting, Aborted)
                | (Aborting, Failed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "INIT",
            SessionState::Uploading => "UPLOADING",
            SessionState::Completing => "COMPLETING",
            SessionState::Done => "DONE",
            SessionState::Aborting => "ABORTING",
            SessionState::Aborted => "ABORTED",
            SessionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One transfer attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_id: String,
    pub object_key: String,
    pub part_size: u64,
    pub part_count: u32,
    pub file_size: u64,
    pub file_fingerprint: FileFingerprint,
    pub created_at: DateTime<Utc>,
    state: SessionState,
}

impl UploadSession {
    pub fn new(
        upload_id: impl Into<String>,
        object_key: impl Into<String>,
        plan: PartPlan,
        file_size: u64,
        file_fingerprint: FileFingerprint,
    ) -> Self {
        Self {
            upload_id: upload_id.into(),
            object_key: object_key.into(),
            part_size: plan.part_size,
            part_count: plan.part_count,
            file_size,
            file_fingerprint,
            created_at: Utc::now(),
            state: SessionState::Init,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn plan(&self) -> PartPlan {
        PartPlan {
            part_size: self.part_size,
            part_count: self.part_count,
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(&mut self, next: SessionState) -> Result<(), UploadError> {
        if !self.state.can_transition_to(next) {
            return Err(UploadError::InvalidState(format!(
                "cannot move upload {} from {} to {}",
                self.upload_id, self.state, next
            )));
        }
        tracing::debug!(upload_id = %self.upload_id, from = %self.state, to = %next, "Session state change");
        self.state = next;
        Ok(())
    }

    /// Byte range of a 1-based part number
    pub fn byte_range(&self, part_number: u32) -> ByteRange {
        let start = u64::from(part_number.saturating_sub(1)) * self.part_size;
        let len = self.plan().part_len(self.file_size, part_number);
        ByteRange::new(start, start + len)
    }

    /// All part numbers, `1..=part_count`
    pub fn part_numbers(&self) -> impl Iterator<Item = u32> {
        1..=self.part_count
    }
}

/// State of a single part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartState {
    Pending,
    InFlight,
    Completed,
    Failed,
}

/// One slice of the file, mutated only by the coordinator's control loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    pub part_number: u32,
    pub state: PartState,
    pub integrity_tag: Option<String>,
    pub attempt_count: u32,
}

impl PartRecord {
    pub fn pending(part_number: u32) -> Self {
        Self {
            part_number,
            state: PartState::Pending,
            integrity_tag: None,
            attempt_count: 0,
        }
    }

    pub fn complete(&mut self, integrity_tag: String) {
        self.state = PartState::Completed;
        self.integrity_tag = Some(integrity_tag);
    }

    pub fn is_completed(&self) -> bool {
        self.state == PartState::Completed
    }
}
