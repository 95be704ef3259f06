//! Concrete collaborators for rollcalld
//!
//! Provides:
//! - Google Calendar event listing
//! - Slack threads for attendance posts
//! - A W3C WebDriver browser agent, one WebDriver session per handle
//! - Sign-in credentials from the environment or an interactive prompt

mod credentials;
mod google_calendar;
mod slack;
mod token;
mod webdriver;

pub use credentials::*;
pub use google_calendar::*;
pub use slack::*;
pub use token::*;
pub use webdriver::*;
