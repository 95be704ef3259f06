//! Error types for rollcall

use thiserror::Error;

/// Shared error type for operations that do not belong to a single collaborator
#[derive(Debug, Error)]
pub enum RollcallError {
    #[error("Invalid timestamp '{value}': {message}")]
    InvalidTimestamp { value: String, message: String },

    #[error("Invalid session: {0}")]
    InvalidSession(String),
}

impl RollcallError {
    pub fn timestamp(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            value: value.into(),
            message: message.into(),
        }
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::InvalidSession(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RollcallError>;
