//! Configuration validation

use crate::schema::{RawConfig, RawScheduleConfig, RawTimingConfig};
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Missing required value: {0}")]
    MissingValue(String),

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("'{0}' must be greater than zero")]
    ZeroValue(String),

    #[error("Invalid pattern for '{field}': {message}")]
    InvalidPattern { field: String, message: String },

    #[error("Invalid URL for '{field}': {value}")]
    InvalidUrl { field: String, value: String },

    #[error("Duplicate excluded title: {0}")]
    DuplicateExcludedTitle(String),
}

/// Validate a raw configuration, collecting every problem found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_schedule(&config.schedule));
    errors.extend(validate_timing(&config.timing));

    let calendar = &config.calendar;
    if calendar.calendar_id.trim().is_empty() {
        errors.push(ValidationError::MissingValue("calendar.calendar_id".into()));
    }
    if let Some(pattern) = &calendar.cancelled_pattern {
        if let Err(e) = Regex::new(pattern) {
            errors.push(ValidationError::InvalidPattern {
                field: "calendar.cancelled_pattern".into(),
                message: e.to_string(),
            });
        }
    }
    let mut seen = HashSet::new();
    for title in &calendar.excluded_titles {
        if !seen.insert(title) {
            errors.push(ValidationError::DuplicateExcludedTitle(title.clone()));
        }
    }
    check_url("calendar.api_base", calendar.api_base.as_deref(), &mut errors);

    let messaging = &config.messaging;
    if messaging.channel_id.trim().is_empty() {
        errors.push(ValidationError::MissingValue("messaging.channel_id".into()));
    }
    if messaging.history_limit == Some(0) {
        errors.push(ValidationError::ZeroValue("messaging.history_limit".into()));
    }
    check_url("messaging.api_base", messaging.api_base.as_deref(), &mut errors);

    check_url(
        "browser.webdriver_url",
        config.browser.webdriver_url.as_deref(),
        &mut errors,
    );
    check_url(
        "browser.sign_in_url",
        config.browser.sign_in_url.as_deref(),
        &mut errors,
    );
    if config.browser.poll_interval_ms == Some(0) {
        errors.push(ValidationError::ZeroValue("browser.poll_interval_ms".into()));
    }

    errors
}

fn validate_schedule(schedule: &RawScheduleConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(horizon) = &schedule.horizon_end {
        if let Err(e) = rollcall_util::parse_local_datetime(horizon) {
            errors.push(ValidationError::InvalidTimeFormat {
                value: horizon.clone(),
                message: e.to_string(),
            });
        }
    }

    let positive = [
        ("schedule.window_minutes", schedule.window_minutes),
        ("schedule.sleep_slice_seconds", schedule.sleep_slice_seconds),
    ];
    for (field, value) in positive {
        if value == Some(0) {
            errors.push(ValidationError::ZeroValue(field.into()));
        }
    }

    let limits = [
        ("schedule.max_concurrent_sessions", schedule.max_concurrent_sessions),
        ("schedule.max_concurrent_fetches", schedule.max_concurrent_fetches),
    ];
    for (field, value) in limits {
        if value == Some(0) {
            errors.push(ValidationError::ZeroValue(field.into()));
        }
    }

    errors
}

fn validate_timing(timing: &RawTimingConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // A zero poll period would spin; a zero timeout never finds the control.
    let positive = [
        ("timing.admit_poll_seconds", timing.admit_poll_seconds),
        ("timing.attendance_sample_seconds", timing.attendance_sample_seconds),
        ("timing.join_control_timeout_seconds", timing.join_control_timeout_seconds),
    ];
    for (field, value) in positive {
        if value == Some(0) {
            errors.push(ValidationError::ZeroValue(field.into()));
        }
    }

    if timing.join_attempts == Some(0) {
        errors.push(ValidationError::ZeroValue("timing.join_attempts".into()));
    }

    if let (Some(sample), Some(window)) = (
        timing.attendance_sample_seconds,
        timing.attendance_window_seconds,
    ) {
        if sample > window {
            tracing::warn!(
                sample_secs = sample,
                window_secs = window,
                "Attendance sample period exceeds the attendance window; only one sample will be taken"
            );
        }
    }

    errors
}

fn check_url(field: &str, value: Option<&str>, errors: &mut Vec<ValidationError>) {
    if let Some(url) = value {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError::InvalidUrl {
                field: field.into(),
                value: url.into(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;

    fn minimal() -> RawConfig {
        RawConfig {
            config_version: 1,
            service: Default::default(),
            schedule: Default::default(),
            timing: Default::default(),
            calendar: RawCalendarConfig {
                calendar_id: "primary".into(),
                api_base: None,
                token_env: None,
                cancelled_pattern: None,
                excluded_titles: vec![],
            },
            messaging: RawMessagingConfig {
                channel_id: "C0123".into(),
                api_base: None,
                token_env: None,
                service_account_name: None,
                history_limit: None,
            },
            browser: Default::default(),
            credentials: Default::default(),
        }
    }

    #[test]
    fn test_minimal_config_is_valid() {
        assert!(validate_config(&minimal()).is_empty());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = minimal();
        config.schedule.window_minutes = Some(0);
        config.timing.admit_poll_seconds = Some(0);
        config.timing.join_attempts = Some(0);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::ZeroValue(_))));
    }

    #[test]
    fn test_bad_cancelled_pattern_rejected() {
        let mut config = minimal();
        config.calendar.cancelled_pattern = Some("^(Cancel".into());

        let errors = validate_config(&config);
        assert!(matches!(
            errors.as_slice(),
            [ValidationError::InvalidPattern { field, .. }] if field == "calendar.cancelled_pattern"
        ));
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = minimal();
        config.calendar.calendar_id = "  ".into();
        config.messaging.channel_id = String::new();
        config.schedule.horizon_end = Some("next tuesday".into());
        config.browser.webdriver_url = Some("localhost:4444".into());
        config.calendar.excluded_titles = vec!["Out of office".into(), "Out of office".into()];

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 5);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidTimeFormat { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidUrl { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateExcludedTitle(_))));
    }
}
