//! Store trait definitions

use rollcall_api::{AttendanceLog, Session, SessionReport};
use rollcall_util::SessionId;

use crate::{SessionRecord, StoreResult};

/// Attendance persistence.
///
/// Implementations must be safe to call from many supervisors at once.
pub trait AttendanceStore: Send + Sync {
    /// Append one attendance sample as it is posted
    fn record_attendance(&self, session: &Session, log: &AttendanceLog) -> StoreResult<()>;

    /// Record the outcome of a finished supervisor run
    fn record_session(&self, report: &SessionReport) -> StoreResult<()>;

    /// Most recently recorded session outcomes, newest first
    fn recent_sessions(&self, limit: usize) -> StoreResult<Vec<SessionRecord>>;

    /// Every attendance sample recorded for a session, oldest first
    fn attendance_for(&self, session_id: &SessionId) -> StoreResult<Vec<AttendanceLog>>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
