//! Validated configuration consumed by the monitor and its adapters

use crate::schema::{
    RawBrowserConfig, RawCalendarConfig, RawConfig, RawCredentialsConfig, RawMessagingConfig,
    RawScheduleConfig, RawSelectors, RawServiceConfig, RawTimingConfig,
};
use chrono::{DateTime, Local};
use rollcall_util::default_data_dir;
use std::path::PathBuf;
use std::time::Duration;

/// Default pattern for titles of cancelled events.
/// Matches both `(Cancelled) Standup` and `Cancelled: Standup`.
pub const DEFAULT_CANCELLED_PATTERN: &str = r"^\(?[Cc]ancel";

pub const DEFAULT_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const DEFAULT_CALENDAR_TOKEN_ENV: &str = "ROLLCALL_CALENDAR_TOKEN";
pub const DEFAULT_MESSAGING_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_MESSAGING_TOKEN_ENV: &str = "ROLLCALL_SLACK_TOKEN";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";
pub const DEFAULT_SIGN_IN_URL: &str = "https://accounts.google.com/signin/v2/identifier";

/// The complete validated configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub service: ServiceConfig,
    pub schedule: ScheduleConfig,
    pub timing: TimingPolicy,
    pub calendar: CalendarConfig,
    pub messaging: MessagingConfig,
    pub browser: BrowserConfig,
    pub credentials: CredentialsConfig,
}

impl MonitorConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            schedule: ScheduleConfig::from_raw(raw.schedule),
            timing: TimingPolicy::from_raw(raw.timing),
            calendar: CalendarConfig::from_raw(raw.calendar),
            messaging: MessagingConfig::from_raw(raw.messaging),
            browser: BrowserConfig::from_raw(raw.browser),
            credentials: CredentialsConfig::from_raw(raw.credentials),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub record_attendance: bool,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            record_attendance: raw.record_attendance.unwrap_or(true),
        }
    }
}

/// How the monitoring horizon is cut into calendar windows
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// End of the monitoring horizon; `None` when it must come from the command line
    pub horizon_end: Option<DateTime<Local>>,
    pub window: Duration,
    pub lead_time: Duration,
    pub start_offset: Duration,
    pub max_concurrent_sessions: usize,
    pub max_concurrent_fetches: usize,
    pub sleep_slice: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            horizon_end: None,
            window: Duration::from_secs(60 * 60),
            lead_time: Duration::from_secs(5 * 60),
            start_offset: Duration::from_secs(1),
            max_concurrent_sessions: 32,
            max_concurrent_fetches: 4,
            sleep_slice: Duration::from_secs(30),
        }
    }
}

impl ScheduleConfig {
    fn from_raw(raw: RawScheduleConfig) -> Self {
        let defaults = Self::default();
        Self {
            horizon_end: raw
                .horizon_end
                .and_then(|s| rollcall_util::parse_local_datetime(&s).ok()),
            window: raw
                .window_minutes
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.window),
            lead_time: raw
                .lead_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.lead_time),
            start_offset: raw
                .start_offset_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.start_offset),
            max_concurrent_sessions: raw
                .max_concurrent_sessions
                .unwrap_or(defaults.max_concurrent_sessions),
            max_concurrent_fetches: raw
                .max_concurrent_fetches
                .unwrap_or(defaults.max_concurrent_fetches),
            sleep_slice: raw
                .sleep_slice_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.sleep_slice),
        }
    }
}

/// Timings that drive one session supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingPolicy {
    pub admit_poll: Duration,
    pub attendance_sample: Duration,
    /// Measured from session start
    pub early_admission: Duration,
    /// Measured from session start; independent of `early_admission`
    pub attendance_window: Duration,
    /// Measured from session end
    pub trailing_buffer: Duration,
    pub join_attempts: u32,
    pub join_control_timeout: Duration,
    pub join_retry_backoff: Duration,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            admit_poll: Duration::from_secs(5),
            attendance_sample: Duration::from_secs(3 * 60),
            early_admission: Duration::from_secs(5 * 60),
            attendance_window: Duration::from_secs(15 * 60 + 10),
            trailing_buffer: Duration::from_secs(5 * 60),
            join_attempts: 6,
            join_control_timeout: Duration::from_secs(5),
            join_retry_backoff: Duration::from_secs(1),
        }
    }
}

impl TimingPolicy {
    fn from_raw(raw: RawTimingConfig) -> Self {
        let d = Self::default();
        let secs = |v: Option<u64>, fallback: Duration| v.map(Duration::from_secs).unwrap_or(fallback);
        Self {
            admit_poll: secs(raw.admit_poll_seconds, d.admit_poll),
            attendance_sample: secs(raw.attendance_sample_seconds, d.attendance_sample),
            early_admission: secs(raw.early_admission_seconds, d.early_admission),
            attendance_window: secs(raw.attendance_window_seconds, d.attendance_window),
            trailing_buffer: secs(raw.trailing_buffer_seconds, d.trailing_buffer),
            join_attempts: raw.join_attempts.unwrap_or(d.join_attempts),
            join_control_timeout: secs(raw.join_control_timeout_seconds, d.join_control_timeout),
            join_retry_backoff: raw
                .join_retry_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(d.join_retry_backoff),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub calendar_id: String,
    pub api_base: String,
    pub token_env: String,
    /// Regular expression source; compiled by the session filter
    pub cancelled_pattern: String,
    pub excluded_titles: Vec<String>,
}

impl CalendarConfig {
    fn from_raw(raw: RawCalendarConfig) -> Self {
        Self {
            calendar_id: raw.calendar_id,
            api_base: raw
                .api_base
                .unwrap_or_else(|| DEFAULT_CALENDAR_API_BASE.into()),
            token_env: raw
                .token_env
                .unwrap_or_else(|| DEFAULT_CALENDAR_TOKEN_ENV.into()),
            cancelled_pattern: raw
                .cancelled_pattern
                .unwrap_or_else(|| DEFAULT_CANCELLED_PATTERN.into()),
            excluded_titles: raw.excluded_titles,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub channel_id: String,
    pub api_base: String,
    pub token_env: String,
    /// Display name of the agent's own account, dropped from attendance logs
    pub service_account_name: Option<String>,
    pub history_limit: u32,
}

impl MessagingConfig {
    fn from_raw(raw: RawMessagingConfig) -> Self {
        Self {
            channel_id: raw.channel_id,
            api_base: raw
                .api_base
                .unwrap_or_else(|| DEFAULT_MESSAGING_API_BASE.into()),
            token_env: raw
                .token_env
                .unwrap_or_else(|| DEFAULT_MESSAGING_TOKEN_ENV.into()),
            service_account_name: raw.service_account_name,
            history_limit: raw.history_limit.unwrap_or(200),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub sign_in_url: String,
    pub poll_interval: Duration,
    pub selectors: BrowserSelectors,
}

impl BrowserConfig {
    fn from_raw(raw: RawBrowserConfig) -> Self {
        Self {
            webdriver_url: raw
                .webdriver_url
                .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.into()),
            headless: raw.headless.unwrap_or(true),
            sign_in_url: raw.sign_in_url.unwrap_or_else(|| DEFAULT_SIGN_IN_URL.into()),
            poll_interval: raw
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(250)),
            selectors: BrowserSelectors::from_raw(raw.selectors),
        }
    }
}

/// Element locators used by the browser agent.
///
/// Values starting with `/` or `(` are XPath expressions; anything else is a
/// CSS selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSelectors {
    pub email_input: String,
    pub email_next: String,
    pub password_input: String,
    pub password_next: String,
    pub join_button: String,
    /// Present only while the agent is inside a live session
    pub in_session_marker: String,
    pub mute_button: String,
    pub dialog_dismiss: String,
    pub people_panel_button: String,
    /// Every match is clicked on each admission pass
    pub admit_button: String,
    pub participant_name: String,
}

impl Default for BrowserSelectors {
    fn default() -> Self {
        Self {
            email_input: r#"[type="email"]"#.into(),
            email_next: "#identifierNext".into(),
            password_input: r#"[type="password"]"#.into(),
            password_next: "#passwordNext".into(),
            join_button: r#"button[jsname="Qx7uuf"]"#.into(),
            in_session_marker: r#"[class="P245vb"]"#.into(),
            mute_button: r#"[jsaction="Az4Fr:Jv50ub"]"#.into(),
            dialog_dismiss: r#"//*[text()="Got it"]"#.into(),
            people_panel_button:
                r#"(//*[@class="VfPpkd-Bz112c-LgbsSe yHy1rc eT1oJ JsuyRc boDUxc"])[2]"#.into(),
            admit_button: r#"//*[@class="VfPpkd-vQzf8d" and text()="Admit"]"#.into(),
            participant_name: r#"[class="zWGUib"]"#.into(),
        }
    }
}

impl BrowserSelectors {
    fn from_raw(raw: RawSelectors) -> Self {
        let d = Self::default();
        Self {
            email_input: raw.email_input.unwrap_or(d.email_input),
            email_next: raw.email_next.unwrap_or(d.email_next),
            password_input: raw.password_input.unwrap_or(d.password_input),
            password_next: raw.password_next.unwrap_or(d.password_next),
            join_button: raw.join_button.unwrap_or(d.join_button),
            in_session_marker: raw.in_session_marker.unwrap_or(d.in_session_marker),
            mute_button: raw.mute_button.unwrap_or(d.mute_button),
            dialog_dismiss: raw.dialog_dismiss.unwrap_or(d.dialog_dismiss),
            people_panel_button: raw.people_panel_button.unwrap_or(d.people_panel_button),
            admit_button: raw.admit_button.unwrap_or(d.admit_button),
            participant_name: raw.participant_name.unwrap_or(d.participant_name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CredentialsConfig {
    pub email_env: String,
    pub password_env: String,
    pub interactive: bool,
}

impl CredentialsConfig {
    fn from_raw(raw: RawCredentialsConfig) -> Self {
        Self {
            email_env: raw.email_env.unwrap_or_else(|| "ROLLCALL_EMAIL".into()),
            password_env: raw
                .password_env
                .unwrap_or_else(|| "ROLLCALL_PASSWORD".into()),
            interactive: raw.interactive.unwrap_or(false),
        }
    }
}
