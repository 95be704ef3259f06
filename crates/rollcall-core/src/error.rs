//! Core error type

use chrono::{DateTime, Local};
use rollcall_adapter_api::{CalendarError, MessagingError};
use rollcall_api::FailureReason;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Calendar fetch failed for window {window_start} - {window_end}: {source}")]
    Fetch {
        window_start: DateTime<Local>,
        window_end: DateTime<Local>,
        #[source]
        source: CalendarError,
    },

    #[error("Session '{title}' failed: {reason}")]
    SessionFailed { title: String, reason: FailureReason },

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

pub type CoreResult<T> = Result<T, CoreError>;
