//! Persisted record types

use chrono::{DateTime, Local};
use rollcall_api::{FailureReason, SupervisorState};
use rollcall_util::SessionId;
use serde::{Deserialize, Serialize};

/// A finished supervisor run as read back from the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub title: String,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub join_link: String,
    pub final_state: SupervisorState,
    pub failure: Option<FailureReason>,
    pub entries_posted: usize,
    /// Attendance samples taken during the run, including unposted ones
    pub samples_taken: usize,
    pub recorded_at: DateTime<Local>,
}

impl SessionRecord {
    pub fn succeeded(&self) -> bool {
        self.final_state == SupervisorState::Closed
    }
}
