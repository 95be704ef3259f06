//! Calendar entry filtering

use regex::Regex;
use rollcall_api::{CalendarEntry, Session};
use rollcall_config::CalendarConfig;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::{CoreError, CoreResult};

/// Drops cancelled and excluded entries and validates the rest
#[derive(Debug, Clone)]
pub struct SessionFilter {
    cancelled: Regex,
    excluded_titles: HashSet<String>,
}

impl SessionFilter {
    pub fn new<I>(cancelled_pattern: &str, excluded_titles: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let cancelled = Regex::new(cancelled_pattern).map_err(|e| CoreError::InvalidPattern {
            pattern: cancelled_pattern.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            cancelled,
            excluded_titles: excluded_titles.into_iter().collect(),
        })
    }

    pub fn from_config(config: &CalendarConfig) -> CoreResult<Self> {
        Self::new(&config.cancelled_pattern, config.excluded_titles.iter().cloned())
    }

    pub fn is_excluded(&self, title: &str) -> bool {
        self.cancelled.is_match(title) || self.excluded_titles.contains(title)
    }

    /// Sessions worth monitoring, in calendar order
    pub fn apply(&self, entries: Vec<CalendarEntry>) -> Vec<Session> {
        entries
            .into_iter()
            .filter_map(|entry| {
                if self.is_excluded(&entry.title) {
                    debug!(title = %entry.title, "Skipping cancelled or excluded entry");
                    return None;
                }
                let title = entry.title.clone();
                match Session::from_entry(entry) {
                    Ok(session) => Some(session),
                    Err(e) => {
                        warn!(title = %title, error = %e, "Skipping unusable calendar entry");
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Local, TimeZone};
    use rollcall_config::DEFAULT_CANCELLED_PATTERN;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    fn entry(title: &str) -> CalendarEntry {
        CalendarEntry::new(title, at(9, 0), at(9, 30), Some("https://meet/abc".into()))
    }

    fn filter() -> SessionFilter {
        SessionFilter::new(DEFAULT_CANCELLED_PATTERN, vec!["Out of office".to_string()]).unwrap()
    }

    #[test]
    fn test_cancelled_titles_excluded() {
        let filter = filter();
        assert!(filter.is_excluded("Cancelled: Standup"));
        assert!(filter.is_excluded("(Cancelled) Standup"));
        assert!(filter.is_excluded("cancelled standup"));
        assert!(!filter.is_excluded("Standup"));
        assert!(!filter.is_excluded("Standup (Cancelled)"));
    }

    #[test]
    fn test_cancelled_entry_dropped_from_sessions() {
        let sessions = filter().apply(vec![entry("Cancelled: Standup"), entry("Standup")]);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title(), "Standup");
    }

    #[test]
    fn test_excluded_titles_match_exactly() {
        let sessions = filter().apply(vec![entry("Out of office"), entry("Out of office sync")]);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title(), "Out of office sync");
    }

    #[test]
    fn test_unusable_entries_skipped() {
        let no_link = CalendarEntry::new("Lunch", at(12, 0), at(13, 0), None);
        let backwards = CalendarEntry::new("Oops", at(13, 0), at(12, 0), Some("https://meet/x".into()));
        assert!(filter().apply(vec![no_link, backwards]).is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = SessionFilter::new("^(Cancel", Vec::new());
        assert!(matches!(result, Err(CoreError::InvalidPattern { .. })));
    }
}
