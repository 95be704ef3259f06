//! Browser handle abstraction

use rollcall_util::SessionId;
use serde::{Deserialize, Serialize};

/// Exclusive handle to one isolated browser context
///
/// Created by the browser driver for a single supervisor and released by
/// `close`. Handles are never shared between supervisors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserHandle {
    /// Session the handle was opened for
    pub session_id: SessionId,

    /// Driver-specific payload (opaque to core)
    payload: BrowserHandlePayload,
}

impl BrowserHandle {
    pub fn new(session_id: SessionId, payload: BrowserHandlePayload) -> Self {
        Self { session_id, payload }
    }

    pub fn payload(&self) -> &BrowserHandlePayload {
        &self.payload
    }
}

/// Driver-specific handle payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum BrowserHandlePayload {
    /// W3C WebDriver session
    WebDriver { session: String },

    /// Mock for testing
    Mock { id: u64 },
}

impl BrowserHandlePayload {
    /// WebDriver session id if applicable
    pub fn webdriver_session(&self) -> Option<&str> {
        match self {
            BrowserHandlePayload::WebDriver { session } => Some(session),
            BrowserHandlePayload::Mock { .. } => None,
        }
    }
}
