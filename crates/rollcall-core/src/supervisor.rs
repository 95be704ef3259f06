//! Session supervisor state machine
//!
//! One supervisor drives one session through
//! Joining -> AdmittingPreStart -> AdmittingAndAttending -> Draining -> Closed,
//! dropping to Failed from any live state. The browser handle is closed on
//! every path out.

use chrono::{DateTime, Local};
use rollcall_adapter_api::{BrowserDriver, BrowserHandle, CredentialProvider};
use rollcall_api::{
    AttendanceLog, FailureReason, NotificationThread, Session, SessionReport, SupervisorState,
    ThreadKey,
};
use rollcall_config::TimingPolicy;
use rollcall_store::AttendanceStore;
use rollcall_util::to_chrono;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{AttendanceReporter, Clock, Coordinator, RetryPolicy};

/// Everything a supervisor shares with its siblings
pub struct SupervisorContext {
    pub browser: Arc<dyn BrowserDriver>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub coordinator: Arc<Coordinator>,
    pub reporter: Arc<AttendanceReporter>,
    pub store: Option<Arc<dyn AttendanceStore>>,
    pub clock: Arc<dyn Clock>,
    pub timing: TimingPolicy,
    pub retry: RetryPolicy,
}

type Phase<T = ()> = Result<T, FailureReason>;

pub struct SessionSupervisor {
    session: Session,
    ctx: Arc<SupervisorContext>,
    state: SupervisorState,
    transitions: Vec<SupervisorState>,
    failure: Option<FailureReason>,
    attendance: Vec<AttendanceLog>,
    entries_posted: usize,
}

impl SessionSupervisor {
    pub fn new(session: Session, ctx: Arc<SupervisorContext>) -> Self {
        Self {
            session,
            ctx,
            state: SupervisorState::Joining,
            transitions: vec![SupervisorState::Joining],
            failure: None,
            attendance: Vec::new(),
            entries_posted: 0,
        }
    }

    /// Run the session to completion
    pub async fn run(mut self) -> SessionReport {
        info!(
            session_id = %self.session.id(),
            title = %self.session.title(),
            start = %self.session.start(),
            end = %self.session.end(),
            "Supervisor starting"
        );

        let browser = self.ctx.browser.clone();
        let handle = match browser.open_session(self.session.id()).await {
            Ok(handle) => handle,
            Err(e) => {
                self.fail(FailureReason::OpenFailed {
                    message: e.to_string(),
                });
                // Nothing was opened, so nothing is held
                return self.finish(true);
            }
        };

        if let Err(reason) = self.drive(&handle).await {
            self.fail(reason);
        }

        let released = match browser.close(&handle).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session_id = %self.session.id(), error = %e, "Failed to close browser handle");
                false
            }
        };

        if self.state == SupervisorState::Draining {
            self.transition(SupervisorState::Closed);
        }

        self.finish(released)
    }

    async fn drive(&mut self, handle: &BrowserHandle) -> Phase {
        let thread = self.join(handle).await?;
        self.transition(SupervisorState::AdmittingPreStart);

        admit_loop(&self.ctx, &self.session, handle, self.session.start()).await?;
        self.transition(SupervisorState::AdmittingAndAttending);

        let start = self.session.start();
        let end = self.session.end();
        let admit_until = (start + to_chrono(self.ctx.timing.early_admission)).min(end);
        let attend_until = (start + to_chrono(self.ctx.timing.attendance_window)).min(end);

        let mut logs = Vec::new();
        let mut posted = 0;
        let duties = tokio::try_join!(
            admit_loop(&self.ctx, &self.session, handle, admit_until),
            attendance_loop(
                &self.ctx,
                &self.session,
                handle,
                thread.as_ref(),
                attend_until,
                &mut logs,
                &mut posted,
            ),
        );
        self.attendance = logs;
        self.entries_posted = posted;
        duties?;

        self.transition(SupervisorState::Draining);
        self.ctx
            .clock
            .sleep_until(end + to_chrono(self.ctx.timing.trailing_buffer))
            .await;
        Ok(())
    }

    /// Sign in, open the link and get into the session
    async fn join(&self, handle: &BrowserHandle) -> Phase<Option<NotificationThread>> {
        let ctx = &self.ctx;
        let session_id = self.session.id();

        let credentials = ctx
            .credentials
            .credentials()
            .await
            .map_err(|e| FailureReason::SignInFailed {
                message: e.to_string(),
            })?;
        ctx.browser
            .sign_in(handle, &credentials)
            .await
            .map_err(|e| FailureReason::SignInFailed {
                message: e.to_string(),
            })?;
        ctx.browser
            .navigate(handle, self.session.join_link())
            .await
            .map_err(|e| FailureReason::Browser {
                message: e.to_string(),
            })?;

        self.click_join_with_retry(handle).await?;

        if let Err(e) = ctx.browser.prepare_session(handle).await {
            warn!(session_id = %session_id, error = %e, "Session preparation incomplete, continuing");
        }

        let key = ThreadKey::for_session(&self.session);
        match ctx.coordinator.thread_for(&key).await {
            Ok(thread) => Ok(Some(thread)),
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    key = %key,
                    error = %e,
                    "No notification thread, attendance will not be posted"
                );
                Ok(None)
            }
        }
    }

    async fn click_join_with_retry(&self, handle: &BrowserHandle) -> Phase {
        let ctx = &self.ctx;
        let policy = ctx.retry;
        let session_id = self.session.id();

        for attempt in 1..=policy.max_attempts {
            match ctx.browser.click_join(handle, policy.per_attempt_timeout).await {
                Ok(()) => debug!(session_id = %session_id, attempt, "Join control clicked"),
                Err(e) if e.is_transient() => {
                    debug!(session_id = %session_id, attempt, error = %e, "Join control not ready")
                }
                Err(e) => {
                    return Err(FailureReason::Browser {
                        message: e.to_string(),
                    });
                }
            }

            match ctx.browser.is_live(handle).await {
                Ok(true) => {
                    info!(session_id = %session_id, attempts = attempt, "Joined session");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    debug!(session_id = %session_id, attempt, error = %e, "Liveness check failed while joining")
                }
            }

            if attempt < policy.max_attempts {
                ctx.clock.sleep(policy.backoff).await;
            }
        }

        Err(FailureReason::JoinFailed {
            attempts: policy.max_attempts,
        })
    }

    fn transition(&mut self, next: SupervisorState) {
        if !self.state.can_transition_to(next) {
            error!(
                session_id = %self.session.id(),
                from = %self.state,
                to = %next,
                "Illegal supervisor transition ignored"
            );
            return;
        }

        info!(
            session_id = %self.session.id(),
            title = %self.session.title(),
            from = %self.state,
            to = %next,
            "Supervisor state changed"
        );
        self.state = next;
        self.transitions.push(next);
    }

    fn fail(&mut self, reason: FailureReason) {
        warn!(
            session_id = %self.session.id(),
            title = %self.session.title(),
            state = %self.state,
            reason = %reason,
            "Session failed"
        );
        self.transition(SupervisorState::Failed);
        self.failure = Some(reason);
    }

    fn finish(self, handle_released: bool) -> SessionReport {
        debug_assert!(self.state.is_terminal());
        let report = SessionReport {
            session: self.session,
            final_state: self.state,
            transitions: self.transitions,
            failure: self.failure,
            attendance: self.attendance,
            entries_posted: self.entries_posted,
            handle_released,
        };

        if let Some(store) = &self.ctx.store {
            if let Err(e) = store.record_session(&report) {
                warn!(session_id = %report.session.id(), error = %e, "Failed to record session outcome");
            }
        }

        info!(
            session_id = %report.session.id(),
            title = %report.session.title(),
            final_state = %report.final_state,
            samples = report.attendance.len(),
            posted = report.entries_posted,
            "Supervisor finished"
        );
        report
    }
}

async fn ensure_live(ctx: &SupervisorContext, handle: &BrowserHandle) -> Phase {
    match ctx.browser.is_live(handle).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(FailureReason::RemovedFromSession),
        Err(e) => Err(FailureReason::LivenessCheckFailed {
            message: e.to_string(),
        }),
    }
}

/// Admit waiting participants every `admit_poll` until `until`
async fn admit_loop(
    ctx: &SupervisorContext,
    session: &Session,
    handle: &BrowserHandle,
    until: DateTime<Local>,
) -> Phase {
    loop {
        let now = ctx.clock.now();
        if now >= until {
            return Ok(());
        }

        ensure_live(ctx, handle).await?;

        match ctx.browser.admit_waiting(handle).await {
            Ok(0) => {}
            Ok(admitted) => info!(session_id = %session.id(), admitted, "Admitted waiting participants"),
            Err(e) => warn!(session_id = %session.id(), error = %e, "Admission pass failed"),
        }

        let next = (now + to_chrono(ctx.timing.admit_poll)).min(until);
        ctx.clock.sleep_until(next).await;
    }
}

/// Sample attendance every `attendance_sample` while the next sample still
/// falls before `until`
async fn attendance_loop(
    ctx: &SupervisorContext,
    session: &Session,
    handle: &BrowserHandle,
    thread: Option<&NotificationThread>,
    until: DateTime<Local>,
    logs: &mut Vec<AttendanceLog>,
    posted: &mut usize,
) -> Phase {
    loop {
        let now = ctx.clock.now();
        if now >= until {
            return Ok(());
        }

        ensure_live(ctx, handle).await?;

        let outcome = ctx.reporter.report(session, handle, thread).await;
        if let Some(log) = outcome.log {
            logs.push(log);
        }
        if outcome.posted {
            *posted += 1;
        }

        let next = now + to_chrono(ctx.timing.attendance_sample);
        if next >= until {
            return Ok(());
        }
        ctx.clock.sleep_until(next).await;
    }
}
