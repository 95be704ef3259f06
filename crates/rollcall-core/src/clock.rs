//! Wall-clock source and deferred waits
//!
//! Every timed wait in the core is expressed as "sleep until this wall-clock
//! instant". Long waits are split into slices and the clock is re-read after
//! each one, so a clock adjustment or a suspended host delays a trigger by at
//! most one slice instead of shifting it by the whole gap.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::time::Instant;

use rollcall_util::{saturating_std, to_chrono};

/// Default upper bound on a single sleep slice
pub const DEFAULT_SLEEP_SLICE: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Local>;

    /// Longest single sleep before `now()` is consulted again
    fn sleep_slice(&self) -> Duration;

    async fn sleep(&self, duration: Duration);

    /// Sleep until `deadline`; returns immediately if it has passed
    async fn sleep_until(&self, deadline: DateTime<Local>) {
        loop {
            let remaining = saturating_std(deadline - self.now());
            if remaining.is_zero() {
                return;
            }
            self.sleep(remaining.min(self.sleep_slice())).await;
        }
    }
}

/// The real clock, honoring the development mock-time override
#[derive(Debug, Clone)]
pub struct SystemClock {
    slice: Duration,
}

impl SystemClock {
    pub fn new(slice: Duration) -> Self {
        Self { slice }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(DEFAULT_SLEEP_SLICE)
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        rollcall_util::now()
    }

    fn sleep_slice(&self) -> Duration {
        self.slice
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Wall clock derived from tokio's clock.
///
/// Anchored to a fixed wall-clock instant, it advances with
/// `tokio::time::Instant`, so under a paused runtime whole session
/// lifecycles run instantly and deterministically.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    wall_anchor: DateTime<Local>,
    instant_anchor: Instant,
    slice: Duration,
}

impl VirtualClock {
    pub fn starting_at(wall_anchor: DateTime<Local>) -> Self {
        Self {
            wall_anchor,
            instant_anchor: Instant::now(),
            slice: DEFAULT_SLEEP_SLICE,
        }
    }

    pub fn with_slice(mut self, slice: Duration) -> Self {
        self.slice = slice;
        self
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Local> {
        self.wall_anchor + to_chrono(self.instant_anchor.elapsed())
    }

    fn sleep_slice(&self) -> Duration {
        self.slice
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn anchor() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn virtual_clock_follows_tokio_time() {
        let clock = VirtualClock::starting_at(anchor());
        assert_eq!(clock.now(), anchor());

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), anchor() + chrono::Duration::seconds(90));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_until_reaches_deadline() {
        let clock = VirtualClock::starting_at(anchor()).with_slice(Duration::from_secs(7));
        let deadline = anchor() + chrono::Duration::minutes(2);

        clock.sleep_until(deadline).await;
        assert!(clock.now() >= deadline);
        assert!(clock.now() < deadline + chrono::Duration::seconds(1));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_until_past_deadline_returns_immediately() {
        let clock = VirtualClock::starting_at(anchor());
        clock.sleep_until(anchor() - chrono::Duration::hours(1)).await;
        assert_eq!(clock.now(), anchor());
    }
}
