//! Shared domain types for rollcall
//!
//! This crate defines the vocabulary every other crate speaks:
//! - Calendar sessions and the windows used to batch calendar queries
//! - Session triggers (deferred join actions)
//! - Notification thread keys and handles
//! - Attendance samples and logs
//! - Session supervisor states, failure reasons and run reports

mod attendance;
mod session;
mod state;
mod thread;

pub use attendance::*;
pub use session::*;
pub use state::*;
pub use thread::*;
