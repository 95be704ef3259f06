//! Integration tests for rollcalld
//!
//! These drive the full monitor against mock collaborators in paused tokio
//! time, so multi-hour horizons finish instantly.

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use rollcall_adapter_api::{
    CalendarResult, CalendarService, MockBrowser, MockCalendar, MockMessaging, StaticCredentials,
};
use rollcall_api::{CalendarEntry, FailureReason, SessionReport, SupervisorState, ThreadKey};
use rollcall_config::{MonitorConfig, parse_config};
use rollcall_core::{Collaborators, Monitor, VirtualClock, plan_windows};
use rollcall_store::{AttendanceStore, SqliteStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

fn at(h: u32, m: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
}

fn make_config(horizon_end: &str) -> MonitorConfig {
    parse_config(&format!(
        r#"
        config_version = 1

        [schedule]
        horizon_end = "{}"
        window_minutes = 60
        lead_seconds = 300

        [calendar]
        calendar_id = "team@example.com"

        [messaging]
        channel_id = "C-attendance"
        service_account_name = "Roll Call Bot"
        "#,
        horizon_end
    ))
    .unwrap()
}

fn entry(title: &str, start: DateTime<Local>, minutes: i64) -> CalendarEntry {
    CalendarEntry::new(
        title,
        start,
        start + chrono::Duration::minutes(minutes),
        Some("https://meet.example.com/abc-defg-hij".into()),
    )
}

fn drain(reports: &mut broadcast::Receiver<SessionReport>) -> Vec<SessionReport> {
    let mut drained = Vec::new();
    while let Ok(report) = reports.try_recv() {
        drained.push(report);
    }
    drained
}

struct Fixture {
    calendar: Arc<dyn CalendarService>,
    browser: Arc<MockBrowser>,
    messaging: Arc<MockMessaging>,
    store: Option<Arc<dyn AttendanceStore>>,
}

impl Fixture {
    fn new(calendar: Arc<dyn CalendarService>) -> Self {
        Self {
            calendar,
            browser: Arc::new(
                MockBrowser::new().with_participants(["Ada Lovelace", "Roll Call Bot", "grace@example.com"]),
            ),
            messaging: Arc::new(MockMessaging::new()),
            store: None,
        }
    }

    fn monitor(&self, config: &MonitorConfig) -> Monitor {
        let collaborators = Collaborators {
            calendar: self.calendar.clone(),
            browser: self.browser.clone(),
            messaging: self.messaging.clone(),
            credentials: Arc::new(StaticCredentials::new("bot@example.com", "secret")),
            store: self.store.clone(),
        };
        let clock = Arc::new(VirtualClock::starting_at(at(9, 0)));
        Monitor::new(config, collaborators, clock).unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_hour_horizon_fetches_two_windows() {
    let calendar = Arc::new(MockCalendar::new());
    let fixture = Fixture::new(calendar.clone());

    let summary = fixture.monitor(&make_config("2025-06-02 11:00:00")).run().await;

    assert_eq!(summary.windows_planned, 2);
    let calls = calendar.calls();
    assert_eq!(calls.len(), 2);
    // The first window opens one second after start; the second is clipped
    assert_eq!(calls[0].0, at(9, 0) + chrono::Duration::seconds(1));
    assert_eq!(calls[1].0, calls[0].1);
    assert_eq!(calls[1].1, at(11, 0));
    assert!(calls[1].1 - calls[1].0 < chrono::Duration::hours(1));

    let uneven = plan_windows(at(9, 0), at(11, 30), Duration::from_secs(3600));
    assert_eq!(uneven.len(), 3);
    assert_eq!(uneven[2].duration(), chrono::Duration::minutes(30));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_sessions_are_never_joined() {
    let calendar = Arc::new(MockCalendar::with_entries(vec![
        entry("Cancelled: Standup", at(9, 30), 15),
        entry("(Cancelled) Retro", at(9, 40), 15),
        entry("Standup", at(10, 30), 15),
    ]));
    let fixture = Fixture::new(calendar);
    let monitor = fixture.monitor(&make_config("2025-06-02 11:00:00"));
    let mut reports = monitor.subscribe();

    let summary = monitor.run().await;

    assert_eq!(summary.sessions_run, 1);
    assert_eq!(drain(&mut reports)[0].session.title(), "Standup");
    assert_eq!(fixture.browser.sessions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_liveness_loss_before_start_releases_browser() {
    let calendar = Arc::new(MockCalendar::with_entries(vec![entry("Office hours", at(9, 30), 30)]));
    let mut fixture = Fixture::new(calendar);
    fixture.browser = Arc::new(MockBrowser::new().remove_after_live_checks(2));
    let monitor = fixture.monitor(&make_config("2025-06-02 10:00:00"));
    let mut reports = monitor.subscribe();

    let summary = monitor.run().await;

    assert_eq!(summary.sessions_failed, 1);
    let reports = drain(&mut reports);
    let report = &reports[0];
    assert_eq!(report.failure, Some(FailureReason::RemovedFromSession));
    assert_eq!(
        report.transitions,
        vec![
            SupervisorState::Joining,
            SupervisorState::AdmittingPreStart,
            SupervisorState::Failed
        ]
    );
    assert!(report.handle_released);
    assert_eq!(fixture.browser.open_count(), 0);
    assert!(fixture.browser.sessions().iter().all(|s| s.closed));
}

#[tokio::test(start_paused = true)]
async fn test_identical_sessions_share_one_thread() {
    let calendar = Arc::new(MockCalendar::with_entries(vec![
        entry("Tutoring", at(9, 20), 20),
        entry("Tutoring", at(9, 20), 20),
    ]));
    let mut fixture = Fixture::new(calendar);
    fixture.messaging = Arc::new(MockMessaging::new().with_latency(Duration::from_millis(300)));
    let monitor = fixture.monitor(&make_config("2025-06-02 10:00:00"));
    let mut reports = monitor.subscribe();

    let summary = monitor.run().await;

    assert_eq!(summary.sessions_closed, 2);
    assert_eq!(fixture.messaging.create_calls(), 1);
    assert_eq!(fixture.messaging.max_concurrent_calls(), 1);

    let messages = fixture.messaging.messages();
    let thread = &messages[0].thread_id;
    assert!(messages.iter().all(|m| &m.thread_id == thread));

    // Both supervisors posted, and every entry is a whole log
    let posted: usize = drain(&mut reports).iter().map(|r| r.entries_posted).sum();
    assert!(posted >= 2);
    assert_eq!(messages.len(), posted);
    for message in &messages {
        let mut lines = message.text.lines();
        let header = lines.next().unwrap();
        assert!(header.ends_with("AM") || header.ends_with("PM"));
        assert!(lines.all(|line| line == " ∙ Ada Lovelace ✔️"));
    }

    let key = ThreadKey::format("Tutoring", &at(9, 20), &at(9, 40));
    assert_eq!(key.as_str(), "Tutoring Monday, June 2⋅9:20am - 9:40am");
}

#[tokio::test(start_paused = true)]
async fn test_failed_window_fetch_is_isolated() {
    let calendar = Arc::new(MockCalendar::with_entries(vec![
        entry("Early", at(9, 30), 15),
        entry("Late", at(10, 30), 15),
    ]));
    calendar.fail_window(at(9, 0) + chrono::Duration::seconds(1));
    let fixture = Fixture::new(calendar);
    let monitor = fixture.monitor(&make_config("2025-06-02 11:00:00"));
    let mut reports = monitor.subscribe();

    let summary = monitor.run().await;

    assert_eq!(summary.windows_failed, 1);
    assert_eq!(summary.sessions_closed, 1);
    assert_eq!(drain(&mut reports)[0].session.title(), "Late");
}

#[tokio::test(start_paused = true)]
async fn test_join_retries_are_bounded() {
    let calendar = Arc::new(MockCalendar::with_entries(vec![
        entry("Locked room", at(9, 30), 15),
        entry("Open room", at(9, 30), 15),
    ]));
    let fixture = Fixture::new(calendar);
    let config = make_config("2025-06-02 10:00:00");
    let monitor = fixture.monitor(&config);

    // Every context misses the join control, so both sessions give up
    let stuck = Arc::new(MockBrowser::new().never_joinable());
    let collaborators = Collaborators {
        calendar: fixture.calendar.clone(),
        browser: stuck.clone(),
        messaging: fixture.messaging.clone(),
        credentials: Arc::new(StaticCredentials::new("bot@example.com", "secret")),
        store: None,
    };
    let clock = Arc::new(VirtualClock::starting_at(at(9, 0)));
    let stuck_monitor = Monitor::new(&config, collaborators, clock).unwrap();
    let mut reports = stuck_monitor.subscribe();

    let summary = stuck_monitor.run().await;
    assert_eq!(summary.sessions_failed, 2);
    let reports = drain(&mut reports);
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.failure, Some(FailureReason::JoinFailed { attempts: 6 }));
        assert!(report.handle_released);
    }
    assert!(stuck.sessions().iter().all(|s| s.join_attempts == 6 && s.closed));
    assert!(fixture.messaging.messages().is_empty());

    // The same schedule with a joinable browser closes cleanly
    let summary = monitor.run().await;
    assert_eq!(summary.sessions_closed, 2);
}

/// Calendar whose first query panics
struct PanickingCalendar {
    inner: MockCalendar,
    calls: AtomicUsize,
}

#[async_trait]
impl CalendarService for PanickingCalendar {
    async fn list_sessions(
        &self,
        window_start: DateTime<Local>,
        window_end: DateTime<Local>,
    ) -> CalendarResult<Vec<CalendarEntry>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("calendar client bug");
        }
        self.inner.list_sessions(window_start, window_end).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_window_is_isolated() {
    let calendar = Arc::new(PanickingCalendar {
        inner: MockCalendar::with_entries(vec![entry("Late", at(10, 30), 15)]),
        calls: AtomicUsize::new(0),
    });
    let fixture = Fixture::new(calendar.clone());

    let summary = fixture.monitor(&make_config("2025-06-02 11:00:00")).run().await;

    assert_eq!(calendar.calls.load(Ordering::SeqCst), 2);
    assert_eq!(summary.windows_failed, 1);
    assert_eq!(summary.sessions_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_outcomes_recorded_in_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("rollcall.db")).unwrap());

    let calendar = Arc::new(MockCalendar::with_entries(vec![
        entry("Standup", at(9, 30), 20),
        entry("Planning", at(9, 40), 20),
    ]));
    let mut fixture = Fixture::new(calendar);
    fixture.store = Some(store.clone());
    let monitor = fixture.monitor(&make_config("2025-06-02 10:00:00"));
    let mut reports = monitor.subscribe();

    let summary = monitor.run().await;
    assert_eq!(summary.sessions_closed, 2);

    let recorded = store.recent_sessions(10).unwrap();
    assert_eq!(recorded.len(), 2);
    assert!(recorded.iter().all(|r| r.succeeded()));

    for report in drain(&mut reports) {
        let logs = store.attendance_for(report.session.id()).unwrap();
        assert_eq!(logs.len(), report.attendance.len());
        assert!(logs.iter().all(|log| log.present == vec!["Ada Lovelace"]));
    }
}
