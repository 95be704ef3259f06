//! Notification thread keys and handles

use chrono::{DateTime, TimeZone};
use rollcall_util::{ChannelId, ThreadId, format_long_date, format_short_time};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::Session;

/// Text identity of a session in the messaging channel
///
/// Two sessions with the same title, date and time range share a key and
/// therefore share one notification thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadKey(String);

impl ThreadKey {
    /// Build the key `"{title} {Weekday, Month D}⋅{start} - {end}"`
    pub fn format<Tz: TimeZone>(title: &str, start: &DateTime<Tz>, end: &DateTime<Tz>) -> Self
    where
        Tz::Offset: Display,
    {
        Self(format!(
            "{} {}⋅{} - {}",
            title,
            format_long_date(start),
            format_short_time(start),
            format_short_time(end)
        ))
    }

    pub fn for_session(session: &Session) -> Self {
        Self::format(session.title(), &session.start(), &session.end())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a thread in the messaging channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationThread {
    pub channel_id: ChannelId,
    pub thread_id: ThreadId,
}

impl NotificationThread {
    pub fn new(channel_id: ChannelId, thread_id: ThreadId) -> Self {
        Self {
            channel_id,
            thread_id,
        }
    }
}
