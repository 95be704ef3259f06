//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Process-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Horizon, window size and concurrency limits
    #[serde(default)]
    pub schedule: RawScheduleConfig,

    /// Per-session lifecycle timings
    #[serde(default)]
    pub timing: RawTimingConfig,

    pub calendar: RawCalendarConfig,

    pub messaging: RawMessagingConfig,

    #[serde(default)]
    pub browser: RawBrowserConfig,

    #[serde(default)]
    pub credentials: RawCredentialsConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the attendance database
    pub data_dir: Option<PathBuf>,

    /// Persist attendance logs and session summaries (default: true)
    pub record_attendance: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawScheduleConfig {
    /// Local timestamp at which monitoring stops, e.g. `2025-12-31 23:59:59`.
    /// May be supplied on the command line instead.
    pub horizon_end: Option<String>,

    /// Calendar query window size (default: 60)
    pub window_minutes: Option<u64>,

    /// How long before a session starts its supervisor launches (default: 300)
    pub lead_seconds: Option<u64>,

    /// Delay between startup and the first window (default: 1)
    pub start_offset_seconds: Option<u64>,

    /// Upper bound on concurrently running session supervisors (default: 32)
    pub max_concurrent_sessions: Option<usize>,

    /// Upper bound on concurrent calendar fetches (default: 4)
    pub max_concurrent_fetches: Option<usize>,

    /// Longest single sleep before the wall clock is re-read (default: 30)
    pub sleep_slice_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTimingConfig {
    /// Admission / liveness poll period (default: 5)
    pub admit_poll_seconds: Option<u64>,

    /// Attendance sample period (default: 180)
    pub attendance_sample_seconds: Option<u64>,

    /// How long past start waiting guests are still admitted (default: 300)
    pub early_admission_seconds: Option<u64>,

    /// How long past start attendance is sampled (default: 910)
    pub attendance_window_seconds: Option<u64>,

    /// How long past end the agent stays in the session (default: 300)
    pub trailing_buffer_seconds: Option<u64>,

    /// Join control attempts before giving up (default: 6)
    pub join_attempts: Option<u32>,

    /// Per-attempt wait for the join control (default: 5)
    pub join_control_timeout_seconds: Option<u64>,

    /// Pause between join attempts (default: 1000)
    pub join_retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawCalendarConfig {
    /// Calendar to read sessions from
    pub calendar_id: String,

    /// REST API base (default: Google Calendar v3)
    pub api_base: Option<String>,

    /// Environment variable holding the OAuth access token
    pub token_env: Option<String>,

    /// Titles matching this pattern are treated as cancelled
    pub cancelled_pattern: Option<String>,

    /// Titles excluded verbatim (out-of-office blocks and the like)
    #[serde(default)]
    pub excluded_titles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawMessagingConfig {
    /// Channel that receives notification threads
    pub channel_id: String,

    /// Web API base (default: Slack)
    pub api_base: Option<String>,

    /// Environment variable holding the bot token
    pub token_env: Option<String>,

    /// Display name of the account the agent joins as; never reported present
    pub service_account_name: Option<String>,

    /// How many recent channel messages to scan when looking up a thread
    pub history_limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawBrowserConfig {
    /// WebDriver endpoint (default: http://localhost:4444)
    pub webdriver_url: Option<String>,

    /// Run the browser without a window (default: true)
    pub headless: Option<bool>,

    /// Page that starts the sign-in flow
    pub sign_in_url: Option<String>,

    /// Interval between element lookups while waiting (default: 250)
    pub poll_interval_ms: Option<u64>,

    /// Selector overrides; unset fields keep the built-in defaults
    #[serde(default)]
    pub selectors: RawSelectors,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSelectors {
    pub email_input: Option<String>,
    pub email_next: Option<String>,
    pub password_input: Option<String>,
    pub password_next: Option<String>,
    pub join_button: Option<String>,
    pub in_session_marker: Option<String>,
    pub mute_button: Option<String>,
    pub dialog_dismiss: Option<String>,
    pub people_panel_button: Option<String>,
    pub admit_button: Option<String>,
    pub participant_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCredentialsConfig {
    /// Environment variable holding the sign-in email (default: ROLLCALL_EMAIL)
    pub email_env: Option<String>,

    /// Environment variable holding the sign-in password (default: ROLLCALL_PASSWORD)
    pub password_env: Option<String>,

    /// Prompt on the terminal when the variables are unset (default: false)
    pub interactive: Option<bool>,
}
