//! Mock collaborators for testing

use async_trait::async_trait;
use chrono::{DateTime, Local};
use rollcall_api::{CalendarEntry, NotificationThread, ThreadKey};
use rollcall_util::{ChannelId, SessionId, ThreadId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::{
    BrowserDriver, BrowserError, BrowserHandle, BrowserHandlePayload, BrowserResult,
    CalendarError, CalendarResult, CalendarService, CredentialError, CredentialProvider,
    CredentialResult, Credentials, MessagingError, MessagingResult, MessagingService,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// Calendar

/// In-memory calendar feed
#[derive(Default)]
pub struct MockCalendar {
    entries: Mutex<Vec<CalendarEntry>>,
    failing_windows: Mutex<Vec<DateTime<Local>>>,
    calls: Mutex<Vec<(DateTime<Local>, DateTime<Local>)>>,
}

impl MockCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<CalendarEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    pub fn add_entry(&self, entry: CalendarEntry) {
        lock(&self.entries).push(entry);
    }

    /// Make the fetch for the window starting at `window_start` fail
    pub fn fail_window(&self, window_start: DateTime<Local>) {
        lock(&self.failing_windows).push(window_start);
    }

    /// Every `(window_start, window_end)` queried so far, in call order
    pub fn calls(&self) -> Vec<(DateTime<Local>, DateTime<Local>)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CalendarService for MockCalendar {
    async fn list_sessions(
        &self,
        window_start: DateTime<Local>,
        window_end: DateTime<Local>,
    ) -> CalendarResult<Vec<CalendarEntry>> {
        lock(&self.calls).push((window_start, window_end));

        if lock(&self.failing_windows).contains(&window_start) {
            return Err(CalendarError::Api {
                status: 503,
                message: "Mock calendar failure".into(),
            });
        }

        Ok(lock(&self.entries)
            .iter()
            .filter(|e| e.end > window_start && e.start < window_end)
            .cloned()
            .collect())
    }
}

// Browser

/// Observable state of one mock browser context
#[derive(Debug, Clone, Default)]
pub struct MockBrowserSession {
    pub session_id: SessionId,
    pub signed_in_as: Option<String>,
    pub navigated_to: Option<String>,
    pub join_attempts: u32,
    pub joined: bool,
    pub prepared: bool,
    pub live_checks: u32,
    pub admitted: usize,
    pub closed: bool,
}

#[derive(Debug, Clone, Default)]
struct MockBrowserBehavior {
    fail_open: bool,
    fail_sign_in: bool,
    fail_prepare: bool,
    /// Join attempts that miss the control before it appears
    join_misses: u32,
    never_joinable: bool,
    /// Liveness turns false after this many successful checks
    remove_after_checks: Option<u32>,
    liveness_error: bool,
    /// Leading liveness checks that error before answering normally
    liveness_errors: u32,
    waiting_per_poll: usize,
    participants: Vec<String>,
    fail_participants: bool,
}

/// Mock browser agent for unit/integration testing
pub struct MockBrowser {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, MockBrowserSession>>,
    behavior: Mutex<MockBrowserBehavior>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            behavior: Mutex::new(MockBrowserBehavior::default()),
        }
    }

    pub fn with_participants<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_participants(names);
        self
    }

    pub fn with_join_misses(self, misses: u32) -> Self {
        lock(&self.behavior).join_misses = misses;
        self
    }

    pub fn never_joinable(self) -> Self {
        lock(&self.behavior).never_joinable = true;
        self
    }

    pub fn remove_after_live_checks(self, checks: u32) -> Self {
        lock(&self.behavior).remove_after_checks = Some(checks);
        self
    }

    pub fn with_liveness_error(self) -> Self {
        lock(&self.behavior).liveness_error = true;
        self
    }

    pub fn with_liveness_errors(self, errors: u32) -> Self {
        lock(&self.behavior).liveness_errors = errors;
        self
    }

    pub fn with_waiting_per_poll(self, waiting: usize) -> Self {
        lock(&self.behavior).waiting_per_poll = waiting;
        self
    }

    pub fn fail_open(self) -> Self {
        lock(&self.behavior).fail_open = true;
        self
    }

    pub fn fail_sign_in(self) -> Self {
        lock(&self.behavior).fail_sign_in = true;
        self
    }

    pub fn fail_prepare(self) -> Self {
        lock(&self.behavior).fail_prepare = true;
        self
    }

    pub fn fail_participants(self) -> Self {
        lock(&self.behavior).fail_participants = true;
        self
    }

    pub fn set_participants<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.behavior).participants = names.into_iter().map(Into::into).collect();
    }

    /// Snapshot of every context opened so far
    pub fn sessions(&self) -> Vec<MockBrowserSession> {
        lock(&self.sessions).values().cloned().collect()
    }

    pub fn session_for(&self, session_id: &SessionId) -> Option<MockBrowserSession> {
        lock(&self.sessions)
            .values()
            .find(|s| &s.session_id == session_id)
            .cloned()
    }

    /// Contexts opened and not yet closed
    pub fn open_count(&self) -> usize {
        lock(&self.sessions).values().filter(|s| !s.closed).count()
    }

    fn behavior(&self) -> MockBrowserBehavior {
        lock(&self.behavior).clone()
    }

    fn take_liveness_error(&self) -> bool {
        let mut behavior = lock(&self.behavior);
        if behavior.liveness_errors > 0 {
            behavior.liveness_errors -= 1;
            true
        } else {
            false
        }
    }

    fn with_session<T>(
        &self,
        handle: &BrowserHandle,
        f: impl FnOnce(&mut MockBrowserSession) -> BrowserResult<T>,
    ) -> BrowserResult<T> {
        let id = match handle.payload() {
            BrowserHandlePayload::Mock { id } => *id,
            _ => return Err(BrowserError::SessionNotFound),
        };
        let mut sessions = lock(&self.sessions);
        match sessions.get_mut(&id) {
            Some(session) if !session.closed => f(session),
            _ => Err(BrowserError::SessionNotFound),
        }
    }
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    async fn open_session(&self, session_id: &SessionId) -> BrowserResult<BrowserHandle> {
        if self.behavior().fail_open {
            return Err(BrowserError::Transport("Mock open failure".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.sessions).insert(
            id,
            MockBrowserSession {
                session_id: session_id.clone(),
                ..Default::default()
            },
        );

        Ok(BrowserHandle::new(
            session_id.clone(),
            BrowserHandlePayload::Mock { id },
        ))
    }

    async fn sign_in(
        &self,
        handle: &BrowserHandle,
        credentials: &Credentials,
    ) -> BrowserResult<()> {
        let fail = self.behavior().fail_sign_in;
        self.with_session(handle, |s| {
            if fail {
                return Err(BrowserError::SignInRejected("Mock sign-in failure".into()));
            }
            s.signed_in_as = Some(credentials.email.clone());
            Ok(())
        })
    }

    async fn navigate(&self, handle: &BrowserHandle, link: &str) -> BrowserResult<()> {
        self.with_session(handle, |s| {
            s.navigated_to = Some(link.to_string());
            Ok(())
        })
    }

    async fn click_join(&self, handle: &BrowserHandle, timeout: Duration) -> BrowserResult<()> {
        let behavior = self.behavior();
        let found = self.with_session(handle, |s| {
            s.join_attempts += 1;
            let found = !behavior.never_joinable && s.join_attempts > behavior.join_misses;
            if found {
                s.joined = true;
            }
            Ok(found)
        })?;

        if found {
            Ok(())
        } else {
            // A real driver spends the whole timeout looking for the control
            tokio::time::sleep(timeout).await;
            Err(BrowserError::control_not_found("join"))
        }
    }

    async fn is_live(&self, handle: &BrowserHandle) -> BrowserResult<bool> {
        let behavior = self.behavior();
        let erroring = behavior.liveness_error || self.take_liveness_error();
        self.with_session(handle, |s| {
            if erroring {
                return Err(BrowserError::Transport("Mock liveness failure".into()));
            }
            s.live_checks += 1;
            if !s.joined {
                return Ok(false);
            }
            Ok(match behavior.remove_after_checks {
                Some(limit) => s.live_checks <= limit,
                None => true,
            })
        })
    }

    async fn prepare_session(&self, handle: &BrowserHandle) -> BrowserResult<()> {
        let fail = self.behavior().fail_prepare;
        self.with_session(handle, |s| {
            if fail {
                return Err(BrowserError::control_not_found("mute"));
            }
            s.prepared = true;
            Ok(())
        })
    }

    async fn admit_waiting(&self, handle: &BrowserHandle) -> BrowserResult<usize> {
        let waiting = self.behavior().waiting_per_poll;
        self.with_session(handle, |s| {
            s.admitted += waiting;
            Ok(waiting)
        })
    }

    async fn list_participants(&self, handle: &BrowserHandle) -> BrowserResult<Vec<String>> {
        let behavior = self.behavior();
        self.with_session(handle, |_| {
            if behavior.fail_participants {
                return Err(BrowserError::control_not_found("participants"));
            }
            Ok(behavior.participants)
        })
    }

    async fn close(&self, handle: &BrowserHandle) -> BrowserResult<()> {
        self.with_session(handle, |s| {
            s.closed = true;
            Ok(())
        })
    }

    async fn close_all(&self) -> usize {
        let mut sessions = lock(&self.sessions);
        let mut closed = 0;
        for session in sessions.values_mut().filter(|s| !s.closed) {
            session.closed = true;
            closed += 1;
        }
        closed
    }
}

// Messaging

/// A message appended to a thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: ChannelId,
    pub thread_id: ThreadId,
    pub text: String,
}

/// In-memory messaging platform.
///
/// Every call waits `latency` so that unsynchronized callers would overlap;
/// `max_concurrent_calls` reports the worst overlap seen.
#[derive(Default)]
pub struct MockMessaging {
    threads: Mutex<HashMap<(ChannelId, ThreadKey), NotificationThread>>,
    messages: Mutex<Vec<PostedMessage>>,
    next_thread: AtomicU64,
    latency: Duration,
    find_calls: AtomicUsize,
    create_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_find: AtomicBool,
    fail_create: AtomicBool,
    fail_append: AtomicBool,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockMessaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Pretend a thread for `key` was created by an earlier run
    pub fn seed_thread(&self, channel: &ChannelId, key: &ThreadKey) -> NotificationThread {
        let thread = self.new_thread(channel);
        lock(&self.threads).insert((channel.clone(), key.clone()), thread.clone());
        thread
    }

    pub fn set_fail_find(&self, fail: bool) {
        self.fail_find.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_append(&self, fail: bool) {
        self.fail_append.store(fail, Ordering::SeqCst);
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<PostedMessage> {
        lock(&self.messages).clone()
    }

    pub fn messages_in(&self, thread_id: &ThreadId) -> Vec<String> {
        lock(&self.messages)
            .iter()
            .filter(|m| &m.thread_id == thread_id)
            .map(|m| m.text.clone())
            .collect()
    }

    fn new_thread(&self, channel: &ChannelId) -> NotificationThread {
        let n = self.next_thread.fetch_add(1, Ordering::SeqCst) + 1;
        NotificationThread::new(channel.clone(), ThreadId::new(format!("mock-thread-{}", n)))
    }

    async fn call(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        guard
    }
}

#[async_trait]
impl MessagingService for MockMessaging {
    async fn find_thread(
        &self,
        channel: &ChannelId,
        key: &ThreadKey,
    ) -> MessagingResult<Option<NotificationThread>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let _call = self.call().await;

        if self.fail_find.load(Ordering::SeqCst) {
            return Err(MessagingError::Transport("Mock find failure".into()));
        }
        Ok(lock(&self.threads)
            .get(&(channel.clone(), key.clone()))
            .cloned())
    }

    async fn create_thread(
        &self,
        channel: &ChannelId,
        key: &ThreadKey,
    ) -> MessagingResult<NotificationThread> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let _call = self.call().await;

        if self.fail_create.load(Ordering::SeqCst) {
            return Err(MessagingError::Api("Mock create failure".into()));
        }
        let thread = self.new_thread(channel);
        lock(&self.threads).insert((channel.clone(), key.clone()), thread.clone());
        Ok(thread)
    }

    async fn append_to_thread(
        &self,
        channel: &ChannelId,
        thread_id: &ThreadId,
        text: &str,
    ) -> MessagingResult<()> {
        let _call = self.call().await;

        if self.fail_append.load(Ordering::SeqCst) {
            return Err(MessagingError::Api("Mock append failure".into()));
        }
        lock(&self.messages).push(PostedMessage {
            channel: channel.clone(),
            thread_id: thread_id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }
}

// Credentials

/// Fixed credentials, or a configured failure
pub struct StaticCredentials {
    credentials: Option<Credentials>,
}

impl StaticCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some(Credentials::new(email, password)),
        }
    }

    pub fn missing() -> Self {
        Self { credentials: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self) -> CredentialResult<Credentials> {
        self.credentials
            .clone()
            .ok_or_else(|| CredentialError::Missing("no static credentials".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn mock_calendar_returns_overlapping_entries() {
        let calendar = MockCalendar::with_entries(vec![
            CalendarEntry::new("Standup", at(9, 0), at(9, 30), Some("https://meet/a".into())),
            CalendarEntry::new("Lunch", at(12, 0), at(13, 0), None),
        ]);

        let found = calendar.list_sessions(at(8, 0), at(10, 0)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Standup");

        calendar.fail_window(at(11, 0));
        assert!(calendar.list_sessions(at(11, 0), at(12, 0)).await.is_err());
        assert_eq!(calendar.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn mock_browser_join_misses_then_succeeds() {
        let browser = MockBrowser::new().with_join_misses(2);
        let session_id = SessionId::new();
        let handle = browser.open_session(&session_id).await.unwrap();

        for _ in 0..2 {
            let err = browser
                .click_join(&handle, Duration::from_secs(5))
                .await
                .unwrap_err();
            assert!(err.is_transient());
        }
        browser.click_join(&handle, Duration::from_secs(5)).await.unwrap();
        assert!(browser.is_live(&handle).await.unwrap());

        let state = browser.session_for(&session_id).unwrap();
        assert_eq!(state.join_attempts, 3);
        assert!(state.joined);
    }

    #[tokio::test]
    async fn mock_browser_removal_and_close() {
        let browser = MockBrowser::new().remove_after_live_checks(1);
        let handle = browser.open_session(&SessionId::new()).await.unwrap();
        browser.click_join(&handle, Duration::ZERO).await.unwrap();

        assert!(browser.is_live(&handle).await.unwrap());
        assert!(!browser.is_live(&handle).await.unwrap());
        assert_eq!(browser.open_count(), 1);

        browser.close(&handle).await.unwrap();
        assert_eq!(browser.open_count(), 0);
        assert!(matches!(
            browser.is_live(&handle).await,
            Err(BrowserError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn mock_browser_close_all() {
        let browser = MockBrowser::new();
        browser.open_session(&SessionId::new()).await.unwrap();
        browser.open_session(&SessionId::new()).await.unwrap();

        assert_eq!(browser.close_all().await, 2);
        assert_eq!(browser.close_all().await, 0);
    }

    #[tokio::test]
    async fn mock_messaging_find_after_create() {
        let messaging = MockMessaging::new();
        let channel = ChannelId::new("C1");
        let key = ThreadKey::format("Standup", &at(9, 0), &at(9, 30));

        assert!(messaging.find_thread(&channel, &key).await.unwrap().is_none());
        let created = messaging.create_thread(&channel, &key).await.unwrap();
        let found = messaging.find_thread(&channel, &key).await.unwrap();
        assert_eq!(found, Some(created.clone()));

        messaging
            .append_to_thread(&channel, &created.thread_id, "9:01:00 AM")
            .await
            .unwrap();
        assert_eq!(messaging.messages_in(&created.thread_id), vec!["9:01:00 AM"]);
        assert_eq!(messaging.create_calls(), 1);
    }

    #[tokio::test]
    async fn static_credentials() {
        let creds = StaticCredentials::new("bot@example.com", "pw")
            .credentials()
            .await
            .unwrap();
        assert_eq!(creds.email, "bot@example.com");
        assert!(StaticCredentials::missing().credentials().await.is_err());
    }
}
