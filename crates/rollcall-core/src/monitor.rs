//! Monitor wiring
//!
//! Plans the horizon into windows, fetches each window's sessions when it
//! opens and hands every session to its own supervisor. A finished
//! supervisor's report is logged, published to subscribers and dropped; the
//! run itself keeps only counts.

use chrono::{DateTime, Local};
use rollcall_adapter_api::{BrowserDriver, CalendarService, CredentialProvider, MessagingService};
use rollcall_api::{SessionReport, SessionTrigger, Window};
use rollcall_config::{MonitorConfig, ScheduleConfig};
use rollcall_store::AttendanceStore;
use rollcall_util::{to_chrono, ChannelId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    plan_session_triggers, plan_windows, AttendanceReporter, BoundedExecutor, Clock, Coordinator,
    CoreError, CoreResult, RetryPolicy, SessionFilter, SessionSupervisor, SupervisorContext,
    Trigger,
};

/// External services the monitor talks to
pub struct Collaborators {
    pub calendar: Arc<dyn CalendarService>,
    pub browser: Arc<dyn BrowserDriver>,
    pub messaging: Arc<dyn MessagingService>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub store: Option<Arc<dyn AttendanceStore>>,
}

/// Reports buffered per subscriber before the oldest are overwritten
const REPORT_CHANNEL_CAPACITY: usize = 64;

/// What one monitoring run did
#[derive(Debug, Clone, Default)]
pub struct MonitorSummary {
    pub windows_planned: usize,
    pub windows_failed: usize,
    pub sessions_run: usize,
    pub sessions_closed: usize,
    pub sessions_failed: usize,
}

pub struct Monitor {
    schedule: ScheduleConfig,
    horizon_end: DateTime<Local>,
    calendar: Arc<dyn CalendarService>,
    filter: Arc<SessionFilter>,
    ctx: Arc<SupervisorContext>,
    clock: Arc<dyn Clock>,
    windows: BoundedExecutor,
    sessions: Arc<BoundedExecutor>,
    reports: broadcast::Sender<SessionReport>,
}

impl Monitor {
    pub fn new(
        config: &MonitorConfig,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        let horizon_end = config.schedule.horizon_end.ok_or_else(|| {
            CoreError::Config("schedule.horizon_end is required to run the monitor".into())
        })?;

        let filter = SessionFilter::from_config(&config.calendar)?;
        let coordinator = Arc::new(Coordinator::new(
            collaborators.messaging,
            ChannelId::new(config.messaging.channel_id.clone()),
        ));
        let store = if config.service.record_attendance {
            collaborators.store
        } else {
            None
        };
        let reporter = Arc::new(AttendanceReporter::new(
            collaborators.browser.clone(),
            coordinator.clone(),
            store.clone(),
            clock.clone(),
            config.messaging.service_account_name.clone(),
        ));

        let ctx = Arc::new(SupervisorContext {
            browser: collaborators.browser,
            credentials: collaborators.credentials,
            coordinator,
            reporter,
            store,
            clock: clock.clone(),
            timing: config.timing.clone(),
            retry: RetryPolicy::from_timing(&config.timing),
        });

        Ok(Self {
            windows: BoundedExecutor::new(
                "windows",
                config.schedule.max_concurrent_fetches,
                clock.clone(),
            ),
            sessions: Arc::new(BoundedExecutor::new(
                "sessions",
                config.schedule.max_concurrent_sessions,
                clock.clone(),
            )),
            schedule: config.schedule.clone(),
            horizon_end,
            calendar: collaborators.calendar,
            filter: Arc::new(filter),
            ctx,
            clock,
            reports: broadcast::channel(REPORT_CHANNEL_CAPACITY).0,
        })
    }

    pub fn horizon_end(&self) -> DateTime<Local> {
        self.horizon_end
    }

    /// Receive each session report as its supervisor finishes
    pub fn subscribe(&self) -> broadcast::Receiver<SessionReport> {
        self.reports.subscribe()
    }

    /// Run until every window has been fetched and every session settled
    pub async fn run(&self) -> MonitorSummary {
        let start_range = self.clock.now() + to_chrono(self.schedule.start_offset);
        let windows = plan_windows(start_range, self.horizon_end, self.schedule.window);

        info!(
            start = %start_range,
            horizon_end = %self.horizon_end,
            windows = windows.len(),
            "Monitoring horizon planned"
        );

        let windows_planned = windows.len();
        for window in windows {
            self.windows.spawn(self.window_trigger(window));
        }

        let window_report = self.windows.settle().await;
        let session_report = self.sessions.settle().await;

        let summary = MonitorSummary {
            windows_planned,
            windows_failed: window_report.failed() + window_report.panicked(),
            sessions_run: session_report.len(),
            sessions_closed: session_report.succeeded(),
            sessions_failed: session_report.failed() + session_report.panicked(),
        };

        info!(
            windows = summary.windows_planned,
            windows_failed = summary.windows_failed,
            sessions = summary.sessions_run,
            closed = summary.sessions_closed,
            failed = summary.sessions_failed,
            "Monitoring horizon exhausted"
        );
        summary
    }

    fn window_trigger(&self, window: Window) -> Trigger {
        let calendar = self.calendar.clone();
        let filter = self.filter.clone();
        let clock = self.clock.clone();
        let sessions = self.sessions.clone();
        let ctx = self.ctx.clone();
        let reports = self.reports.clone();
        let lead = self.schedule.lead_time;

        let label = format!("window {} - {}", window.min, window.max);
        Trigger::new(label, window.min, async move {
            sessions.reap();

            let entries = calendar
                .list_sessions(window.min, window.max)
                .await
                .map_err(|source| CoreError::Fetch {
                    window_start: window.min,
                    window_end: window.max,
                    source,
                })?;

            let listed = entries.len();
            let triggers = plan_session_triggers(filter.apply(entries), &window, lead, clock.now());
            info!(
                window_start = %window.min,
                window_end = %window.max,
                listed,
                scheduled = triggers.len(),
                "Window opened"
            );

            for trigger in triggers {
                sessions.spawn(session_trigger(trigger, ctx.clone(), reports.clone()));
            }
            Ok(())
        })
    }
}

fn session_trigger(
    trigger: SessionTrigger,
    ctx: Arc<SupervisorContext>,
    reports: broadcast::Sender<SessionReport>,
) -> Trigger {
    let SessionTrigger { session, fire_at } = trigger;
    let label = format!("session '{}' at {}", session.title(), session.start());

    Trigger::new(label, fire_at, async move {
        let report = SessionSupervisor::new(session, ctx).run().await;
        let failure = report
            .failure
            .clone()
            .map(|reason| CoreError::SessionFailed {
                title: report.session.title().to_string(),
                reason,
            });

        if failure.is_none() {
            info!(
                session_id = %report.session.id(),
                title = %report.session.title(),
                samples = report.attendance.len(),
                posted = report.entries_posted,
                "Session closed"
            );
        }

        if reports.send(report).is_err() {
            debug!("Session report had no subscribers");
        }

        match failure {
            Some(e) => {
                warn!(error = %e, "Supervisor ended in failure");
                Err(e)
            }
            None => Ok(()),
        }
    })
}
