//! Collaborator error types

use thiserror::Error;

/// Errors from the calendar feed
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Calendar token not available: {0}")]
    MissingToken(String),

    #[error("Calendar request failed: {0}")]
    Transport(String),

    #[error("Calendar API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected calendar response: {0}")]
    InvalidResponse(String),
}

pub type CalendarResult<T> = Result<T, CalendarError>;

/// Errors from the browser agent
#[derive(Debug, Error)]
pub enum BrowserError {
    /// A UI control did not appear in time; retryable
    #[error("Control not found: {selector}")]
    ControlNotFound { selector: String },

    #[error("Browser session not found")]
    SessionNotFound,

    #[error("Sign-in rejected: {0}")]
    SignInRejected(String),

    #[error("Browser transport error: {0}")]
    Transport(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrowserError {
    pub fn control_not_found(selector: impl Into<String>) -> Self {
        Self::ControlNotFound {
            selector: selector.into(),
        }
    }

    /// Whether retrying the same step may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, BrowserError::ControlNotFound { .. })
    }
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// Errors from the messaging platform
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Messaging token not available: {0}")]
    MissingToken(String),

    #[error("Messaging request failed: {0}")]
    Transport(String),

    #[error("Messaging API error: {0}")]
    Api(String),

    #[error("Unexpected messaging response: {0}")]
    InvalidResponse(String),
}

pub type MessagingResult<T> = Result<T, MessagingError>;

/// Errors while obtaining sign-in credentials
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential not configured: {0}")]
    Missing(String),

    #[error("Credential prompt failed: {0}")]
    Prompt(#[from] std::io::Error),
}

pub type CredentialResult<T> = Result<T, CredentialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_controls_are_transient() {
        assert!(BrowserError::control_not_found("#join").is_transient());
        assert!(!BrowserError::SessionNotFound.is_transient());
        assert!(!BrowserError::Transport("reset".into()).is_transient());
    }
}
