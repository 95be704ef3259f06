//! Attendance samples and logs

use chrono::{DateTime, Local};
use rollcall_util::format_time_of_day;
use serde::{Deserialize, Serialize};

/// One displayed participant entry, classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSample {
    pub name: String,
    /// False when the displayed text is an email-address placeholder
    pub present: bool,
}

/// Present guests at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceLog {
    pub taken_at: DateTime<Local>,
    pub present: Vec<String>,
}

impl AttendanceLog {
    pub fn new(taken_at: DateTime<Local>, present: Vec<String>) -> Self {
        Self { taken_at, present }
    }

    /// Message text posted to the notification thread
    pub fn render(&self) -> String {
        let mut text = format_time_of_day(&self.taken_at);
        for name in &self.present {
            text.push_str("\n ∙ ");
            text.push_str(name);
            text.push_str(" ✔️");
        }
        text
    }
}
