//! Sessions, calendar windows and triggers

use chrono::{DateTime, Local};
use rollcall_util::{Result, RollcallError, SessionId};
use serde::{Deserialize, Serialize};

/// Raw item returned by the calendar service, before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub title: String,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub join_link: Option<String>,
}

impl CalendarEntry {
    pub fn new(
        title: impl Into<String>,
        start: DateTime<Local>,
        end: DateTime<Local>,
        join_link: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            start,
            end,
            join_link,
        }
    }
}

/// One calendar-scheduled video-conference occurrence
///
/// Immutable once constructed; `end > start` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    title: String,
    start: DateTime<Local>,
    end: DateTime<Local>,
    join_link: String,
}

impl Session {
    pub fn new(
        title: impl Into<String>,
        start: DateTime<Local>,
        end: DateTime<Local>,
        join_link: impl Into<String>,
    ) -> Result<Self> {
        let title = title.into();
        if end <= start {
            return Err(RollcallError::session(format!(
                "'{}' ends at {} which is not after its start {}",
                title,
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }

        let join_link = join_link.into();
        if join_link.trim().is_empty() {
            return Err(RollcallError::session(format!("'{}' has no join link", title)));
        }

        Ok(Self {
            id: SessionId::new(),
            title,
            start,
            end,
            join_link,
        })
    }

    /// Validate a raw calendar entry
    pub fn from_entry(entry: CalendarEntry) -> Result<Self> {
        let link = entry
            .join_link
            .ok_or_else(|| RollcallError::session(format!("'{}' has no join link", entry.title)))?;
        Self::new(entry.title, entry.start, entry.end, link)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn start(&self) -> DateTime<Local> {
        self.start
    }

    pub fn end(&self) -> DateTime<Local> {
        self.end
    }

    pub fn join_link(&self) -> &str {
        &self.join_link
    }
}

/// Half-open calendar query interval `[min, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub min: DateTime<Local>,
    pub max: DateTime<Local>,
}

impl Window {
    pub fn new(min: DateTime<Local>, max: DateTime<Local>) -> Self {
        debug_assert!(min < max, "window must not be empty");
        Self { min, max }
    }

    pub fn contains(&self, t: DateTime<Local>) -> bool {
        self.min <= t && t < self.max
    }

    pub fn duration(&self) -> chrono::Duration {
        self.max - self.min
    }
}

/// A session bound to the wall-clock instant its supervisor should start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTrigger {
    pub session: Session,
    pub fire_at: DateTime<Local>,
}
