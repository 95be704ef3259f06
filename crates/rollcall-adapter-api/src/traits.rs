//! Collaborator traits

use async_trait::async_trait;
use chrono::{DateTime, Local};
use rollcall_api::{CalendarEntry, NotificationThread, ThreadKey};
use rollcall_util::{ChannelId, SessionId, ThreadId};
use std::time::Duration;

use crate::{
    BrowserHandle, BrowserResult, CalendarResult, CredentialResult, Credentials, MessagingResult,
};

/// Read access to the calendar feed
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Entries overlapping `[window_start, window_end)`, cancelled ones included
    async fn list_sessions(
        &self,
        window_start: DateTime<Local>,
        window_end: DateTime<Local>,
    ) -> CalendarResult<Vec<CalendarEntry>>;
}

/// Mechanics of the browser agent.
///
/// Every method acts on one exclusive handle. The core composes joining a
/// session out of `sign_in`, `navigate` and repeated `click_join`.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a fresh, isolated browser context
    async fn open_session(&self, session_id: &SessionId) -> BrowserResult<BrowserHandle>;

    async fn sign_in(&self, handle: &BrowserHandle, credentials: &Credentials)
        -> BrowserResult<()>;

    async fn navigate(&self, handle: &BrowserHandle, link: &str) -> BrowserResult<()>;

    /// Wait up to `timeout` for the join control and click it.
    /// A missing control is reported as `BrowserError::ControlNotFound`.
    async fn click_join(&self, handle: &BrowserHandle, timeout: Duration) -> BrowserResult<()>;

    /// Whether the agent is still an active participant
    async fn is_live(&self, handle: &BrowserHandle) -> BrowserResult<bool>;

    /// Mute audio, dismiss onboarding dialogs and open the participant panel
    async fn prepare_session(&self, handle: &BrowserHandle) -> BrowserResult<()>;

    /// Admit everyone waiting; returns how many were admitted
    async fn admit_waiting(&self, handle: &BrowserHandle) -> BrowserResult<usize>;

    /// Displayed names of everyone in the participant list
    async fn list_participants(&self, handle: &BrowserHandle) -> BrowserResult<Vec<String>>;

    async fn close(&self, handle: &BrowserHandle) -> BrowserResult<()>;

    /// Close every handle still open; returns how many were closed.
    /// Used on process shutdown.
    async fn close_all(&self) -> usize {
        0
    }
}

/// Send/find/reply access to the messaging platform
#[async_trait]
pub trait MessagingService: Send + Sync {
    /// Look up an existing thread whose root message equals `key`
    async fn find_thread(
        &self,
        channel: &ChannelId,
        key: &ThreadKey,
    ) -> MessagingResult<Option<NotificationThread>>;

    /// Post `key` as a new root message
    async fn create_thread(
        &self,
        channel: &ChannelId,
        key: &ThreadKey,
    ) -> MessagingResult<NotificationThread>;

    async fn append_to_thread(
        &self,
        channel: &ChannelId,
        thread_id: &ThreadId,
        text: &str,
    ) -> MessagingResult<()>;
}

/// Source of the agent's sign-in credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> CredentialResult<Credentials>;
}
