//! Bounded retry policy for UI steps

use rollcall_config::TimingPolicy;
use std::time::Duration;

/// How hard the supervisor tries to get into a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// How long each attempt waits for the control to appear
    pub per_attempt_timeout: Duration,
    /// Pause between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_timing(timing: &TimingPolicy) -> Self {
        Self {
            max_attempts: timing.join_attempts.max(1),
            per_attempt_timeout: timing.join_control_timeout,
            backoff: timing.join_retry_backoff,
        }
    }

    /// Worst-case time spent before giving up
    pub fn budget(&self) -> Duration {
        let attempts = self.max_attempts;
        self.per_attempt_timeout * attempts + self.backoff * attempts.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_timing(&TimingPolicy::default())
    }
}
