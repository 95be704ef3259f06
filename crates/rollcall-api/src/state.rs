//! Session supervisor states and run reports

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AttendanceLog, Session};

/// Lifecycle state of one session supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    /// Opening a browser handle, signing in and joining
    Joining,
    /// Admitting waiting participants until the official start
    AdmittingPreStart,
    /// Admitting and sampling attendance concurrently
    AdmittingAndAttending,
    /// Holding until the session has truly ended
    Draining,
    /// Browser handle released after a normal run
    Closed,
    /// Browser handle released after a failure
    Failed,
}

impl SupervisorState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: SupervisorState) -> bool {
        use SupervisorState::*;

        match (self, next) {
            (Closed | Failed, _) => false,
            (_, Failed) => true,
            (Joining, AdmittingPreStart) => true,
            (AdmittingPreStart, AdmittingAndAttending) => true,
            (AdmittingAndAttending, Draining) => true,
            (Draining, Closed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SupervisorState::Closed | SupervisorState::Failed)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Joining => "joining",
            SupervisorState::AdmittingPreStart => "admitting_pre_start",
            SupervisorState::AdmittingAndAttending => "admitting_and_attending",
            SupervisorState::Draining => "draining",
            SupervisorState::Closed => "closed",
            SupervisorState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a supervisor ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// No browser handle could be opened
    OpenFailed { message: String },
    /// Credentials missing or sign-in rejected
    SignInFailed { message: String },
    /// The join control never led into the session
    JoinFailed { attempts: u32 },
    /// The agent is no longer a participant
    RemovedFromSession,
    /// The liveness check itself errored
    LivenessCheckFailed { message: String },
    /// Any other browser error on the critical path
    Browser { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::OpenFailed { message } => write!(f, "unable to open browser: {}", message),
            FailureReason::SignInFailed { message } => write!(f, "unable to sign in: {}", message),
            FailureReason::JoinFailed { attempts } => {
                write!(f, "unable to join after {} attempts", attempts)
            }
            FailureReason::RemovedFromSession => f.write_str("removed from session"),
            FailureReason::LivenessCheckFailed { message } => {
                write!(f, "liveness check failed: {}", message)
            }
            FailureReason::Browser { message } => write!(f, "browser error: {}", message),
        }
    }
}

/// Outcome of one supervisor run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session: Session,
    pub final_state: SupervisorState,
    /// Every state entered, in order
    pub transitions: Vec<SupervisorState>,
    pub failure: Option<FailureReason>,
    pub attendance: Vec<AttendanceLog>,
    /// Attendance entries successfully appended to the thread
    pub entries_posted: usize,
    /// Whether the browser handle was closed without error
    pub handle_released: bool,
}

impl SessionReport {
    pub fn succeeded(&self) -> bool {
        self.final_state == SupervisorState::Closed
    }
}
