//! Attendance classification and reporting

use chrono::{DateTime, Local};
use regex::Regex;
use rollcall_adapter_api::{BrowserDriver, BrowserHandle};
use rollcall_api::{AttendanceLog, AttendanceSample, NotificationThread, Session};
use rollcall_store::AttendanceStore;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::{Clock, Coordinator};

/// Participants who have not joined are listed by their invitation address
static EMAIL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w.-]+@([\w-]+\.)+[\w-]{2,4}$").expect("EMAIL_SHAPE should compile")
});

/// Present iff the displayed text is not an email address
pub fn classify(name: &str) -> AttendanceSample {
    AttendanceSample {
        name: name.to_string(),
        present: !EMAIL_SHAPE.is_match(name.trim()),
    }
}

/// Present guests, without the agent's own account
pub fn build_log<S: AsRef<str>>(
    names: &[S],
    taken_at: DateTime<Local>,
    service_account: Option<&str>,
) -> AttendanceLog {
    let present = names
        .iter()
        .map(|n| classify(n.as_ref()))
        .filter(|sample| sample.present)
        .filter(|sample| Some(sample.name.as_str()) != service_account)
        .map(|sample| sample.name)
        .collect();
    AttendanceLog::new(taken_at, present)
}

/// Result of one reporting pass
#[derive(Debug, Clone, Default)]
pub struct AttendanceOutcome {
    pub log: Option<AttendanceLog>,
    pub posted: bool,
}

/// Samples the participant list and publishes it.
///
/// Every step is best-effort: failures are logged and reflected in the
/// returned outcome, never propagated.
pub struct AttendanceReporter {
    browser: Arc<dyn BrowserDriver>,
    coordinator: Arc<Coordinator>,
    store: Option<Arc<dyn AttendanceStore>>,
    clock: Arc<dyn Clock>,
    service_account: Option<String>,
}

impl AttendanceReporter {
    pub fn new(
        browser: Arc<dyn BrowserDriver>,
        coordinator: Arc<Coordinator>,
        store: Option<Arc<dyn AttendanceStore>>,
        clock: Arc<dyn Clock>,
        service_account: Option<String>,
    ) -> Self {
        Self {
            browser,
            coordinator,
            store,
            clock,
            service_account,
        }
    }

    pub async fn report(
        &self,
        session: &Session,
        handle: &BrowserHandle,
        thread: Option<&NotificationThread>,
    ) -> AttendanceOutcome {
        let names = match self.browser.list_participants(handle).await {
            Ok(names) => names,
            Err(e) => {
                warn!(session_id = %session.id(), error = %e, "Unable to read participant list");
                return AttendanceOutcome::default();
            }
        };

        let log = build_log(&names, self.clock.now(), self.service_account.as_deref());
        debug!(
            session_id = %session.id(),
            listed = names.len(),
            present = log.present.len(),
            "Attendance sampled"
        );

        let posted = match thread {
            Some(thread) => self.coordinator.post_attendance(thread, &log).await,
            None => {
                debug!(session_id = %session.id(), "No notification thread, attendance not posted");
                false
            }
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.record_attendance(session, &log) {
                warn!(session_id = %session.id(), error = %e, "Failed to record attendance");
            }
        }

        AttendanceOutcome {
            log: Some(log),
            posted,
        }
    }
}
