//! Time-window and session-trigger planning

use chrono::{DateTime, Local};
use rollcall_api::{Session, SessionTrigger, Window};
use rollcall_util::to_chrono;
use std::time::Duration;
use tracing::debug;

/// Minimum distance between "now" and any trigger planned at "now"
pub const TRIGGER_EPSILON: Duration = Duration::from_secs(1);

/// Cut `[start_range, end_range)` into contiguous windows of `interval`.
///
/// The last window is clipped to `end_range`. Returns nothing when the range
/// is empty or the interval is zero.
pub fn plan_windows(
    start_range: DateTime<Local>,
    end_range: DateTime<Local>,
    interval: Duration,
) -> Vec<Window> {
    if end_range <= start_range || interval.is_zero() {
        return Vec::new();
    }

    let step = to_chrono(interval);
    let mut windows = Vec::new();
    let mut min = start_range;
    while min < end_range {
        let max = (min + step).min(end_range);
        windows.push(Window::new(min, max));
        min = max;
    }
    windows
}

/// When a session's supervisor should start: `max(start - lead, now + epsilon)`.
///
/// Sessions whose lead point already passed are started right away rather
/// than skipped.
pub fn fire_time(
    start: DateTime<Local>,
    lead: Duration,
    now: DateTime<Local>,
    epsilon: Duration,
) -> DateTime<Local> {
    (start - to_chrono(lead)).max(now + to_chrono(epsilon))
}

/// Bind every session starting inside `window` to its fire time
pub fn plan_session_triggers(
    sessions: Vec<Session>,
    window: &Window,
    lead: Duration,
    now: DateTime<Local>,
) -> Vec<SessionTrigger> {
    let mut triggers: Vec<SessionTrigger> = sessions
        .into_iter()
        .filter(|session| {
            let inside = window.contains(session.start());
            if !inside {
                // Belongs to a neighbouring window, which plans it
                debug!(
                    session_id = %session.id(),
                    title = %session.title(),
                    start = %session.start(),
                    "Session starts outside window, skipping"
                );
            }
            inside
        })
        .map(|session| SessionTrigger {
            fire_at: fire_time(session.start(), lead, now, TRIGGER_EPSILON),
            session,
        })
        .collect();

    triggers.sort_by_key(|t| t.fire_at);
    triggers
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    fn session(title: &str, start: DateTime<Local>) -> Session {
        Session::new(title, start, start + chrono::Duration::minutes(30), "https://meet/x").unwrap()
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_two_hour_horizon_gives_two_windows() {
        let windows = plan_windows(at(9, 0), at(11, 0), HOUR);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0], Window::new(at(9, 0), at(10, 0)));
        assert_eq!(windows[1], Window::new(at(10, 0), at(11, 0)));
    }

    #[test]
    fn test_last_window_clipped() {
        let windows = plan_windows(at(9, 0), at(10, 30), HOUR);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1], Window::new(at(10, 0), at(10, 30)));
    }

    #[test]
    fn test_windows_tile_range() {
        let start = at(8, 17);
        let end = at(17, 3);
        let windows = plan_windows(start, end, Duration::from_secs(25 * 60));

        assert_eq!(windows.first().map(|w| w.min), Some(start));
        assert_eq!(windows.last().map(|w| w.max), Some(end));
        for pair in windows.windows(2) {
            assert_eq!(pair[0].max, pair[1].min);
            assert!(pair[0].min < pair[0].max);
        }
    }

    #[test]
    fn test_empty_range() {
        assert!(plan_windows(at(10, 0), at(10, 0), HOUR).is_empty());
        assert!(plan_windows(at(11, 0), at(10, 0), HOUR).is_empty());
        assert!(plan_windows(at(9, 0), at(10, 0), Duration::ZERO).is_empty());
    }

    #[test]
    fn test_fire_time_uses_lead() {
        let lead = Duration::from_secs(300);
        assert_eq!(fire_time(at(10, 0), lead, at(9, 0), TRIGGER_EPSILON), at(9, 55));
    }

    #[test]
    fn test_fire_time_clamps_late_sessions() {
        let lead = Duration::from_secs(300);
        let now = at(9, 58);
        let fire = fire_time(at(10, 0), lead, now, TRIGGER_EPSILON);
        assert_eq!(fire, now + chrono::Duration::seconds(1));
        assert!(fire > now);
    }

    #[test]
    fn test_triggers_only_for_sessions_inside_window() {
        let window = Window::new(at(10, 0), at(11, 0));
        let triggers = plan_session_triggers(
            vec![
                session("Retro", at(10, 45)),
                session("Earlier", at(9, 30)),
                session("Standup", at(10, 0)),
                session("Next window", at(11, 0)),
            ],
            &window,
            Duration::from_secs(300),
            at(9, 0),
        );

        let titles: Vec<_> = triggers.iter().map(|t| t.session.title()).collect();
        assert_eq!(titles, vec!["Standup", "Retro"]);
        assert_eq!(triggers[0].fire_at, at(9, 55));
        for t in &triggers {
            assert!(t.fire_at > at(9, 0));
            assert!(t.fire_at <= t.session.start());
        }
    }
}
