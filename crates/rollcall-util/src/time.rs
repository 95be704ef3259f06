//! Time utilities for rollcall
//!
//! Everything the scheduler reasons about is wall-clock time: calendar
//! windows, session start/end, and the fire times derived from them.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `ROLLCALL_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is useful
//! for replaying a calendar day without waiting for it.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! ROLLCALL_MOCK_TIME="2025-12-25 08:55:00" ./rollcalld --until "2025-12-25 18:00:00"
//! ```

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::fmt::Display;
use std::sync::OnceLock;
use std::time::Duration;

use crate::{Result, RollcallError};

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "ROLLCALL_MOCK_TIME";

/// Accepted layouts for user-supplied local timestamps (config and CLI)
const LOCAL_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match parse_local_datetime(&mock_time_str) {
                    Ok(mock_dt) => {
                        let offset = mock_dt.signed_duration_since(chrono::Local::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    Err(e) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            error = %e,
                            "Invalid mock time, using system time"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Parse a local timestamp such as `2025-01-01 00:00:00`.
///
/// RFC 3339 strings with an explicit offset are accepted too and converted
/// to local time.
pub fn parse_local_datetime(value: &str) -> Result<DateTime<Local>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Local));
    }

    for format in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .ok_or_else(|| RollcallError::timestamp(value, "does not exist in local time"));
        }
    }

    Err(RollcallError::timestamp(
        value,
        "expected YYYY-MM-DD HH:MM:SS or RFC 3339",
    ))
}

/// Time of day with seconds, e.g. `9:03:15 AM`. Used as the attendance log header.
pub fn format_time_of_day<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    dt.format("%-I:%M:%S %p").to_string()
}

/// Compact time of day, e.g. `9:00am`. Used in thread keys.
pub fn format_short_time<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    dt.format("%-I:%M%P").to_string()
}

/// Long date without year, e.g. `Friday, October 16`.
pub fn format_long_date<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    dt.format("%A, %B %-d").to_string()
}

/// Format a DateTime for display with full date and time.
pub fn format_datetime_full<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Convert a signed chrono duration into a std duration, clamping negatives to zero
pub fn saturating_std(d: chrono::Duration) -> Duration {
    d.to_std().unwrap_or(Duration::ZERO)
}

/// Convert a std duration into a chrono duration, clamping at a century
pub fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, FixedOffset, Timelike};

    fn fixed(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_format_time_of_day() {
        assert_eq!(format_time_of_day(&fixed(2025, 12, 25, 9, 3, 15)), "9:03:15 AM");
        assert_eq!(format_time_of_day(&fixed(2025, 12, 25, 14, 30, 0)), "2:30:00 PM");
        assert_eq!(format_time_of_day(&fixed(2025, 12, 25, 0, 5, 0)), "12:05:00 AM");
    }

    #[test]
    fn test_format_short_time() {
        assert_eq!(format_short_time(&fixed(2025, 12, 25, 9, 0, 0)), "9:00am");
        assert_eq!(format_short_time(&fixed(2025, 12, 25, 13, 45, 0)), "1:45pm");
    }

    #[test]
    fn test_format_long_date() {
        // 2026-10-16 is a Friday
        assert_eq!(format_long_date(&fixed(2026, 10, 16, 9, 0, 0)), "Friday, October 16");
        assert_eq!(format_long_date(&fixed(2025, 1, 1, 9, 0, 0)), "Wednesday, January 1");
    }

    #[test]
    fn test_format_datetime_full() {
        assert_eq!(
            format_datetime_full(&fixed(2025, 12, 25, 14, 30, 45)),
            "2025-12-25 14:30:45"
        );
    }

    #[test]
    fn test_parse_local_datetime_formats() {
        let dt = parse_local_datetime("2025-01-01 00:00:00").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2025, 1, 1));
        assert_eq!((dt.hour(), dt.minute()), (0, 0));

        let dt = parse_local_datetime("2025-06-30T17:15:00").unwrap();
        assert_eq!((dt.hour(), dt.minute()), (17, 15));

        let dt = parse_local_datetime("2025-06-30 08:05").unwrap();
        assert_eq!((dt.hour(), dt.minute()), (8, 5));

        assert!(parse_local_datetime("2025-06-30T17:15:00+00:00").is_ok());
    }

    #[test]
    fn test_parse_local_datetime_rejects_garbage() {
        let err = parse_local_datetime("next tuesday").unwrap_err();
        assert!(matches!(err, RollcallError::InvalidTimestamp { .. }));
    }

    #[test]
    fn test_duration_conversions() {
        assert_eq!(saturating_std(chrono::Duration::seconds(-5)), Duration::ZERO);
        assert_eq!(saturating_std(chrono::Duration::seconds(90)), Duration::from_secs(90));
        assert_eq!(to_chrono(Duration::from_secs(300)), chrono::Duration::minutes(5));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_now_returns_time() {
        let t = now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }

    #[test]
    fn test_mock_time_env_var_name() {
        assert_eq!(MOCK_TIME_ENV_VAR, "ROLLCALL_MOCK_TIME");
    }
}
