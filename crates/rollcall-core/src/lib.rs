//! Scheduling and session orchestration for rollcalld
//!
//! This crate is the heart of rollcalld, containing:
//! - Time-window and trigger planning over the monitoring horizon
//! - The session supervisor state machine
//!   (Joining -> AdmittingPreStart -> AdmittingAndAttending -> Draining -> Closed)
//! - The coordinator that serializes notification-thread access
//! - A bounded executor that runs deferred triggers and settles them all
//! - Attendance classification and reporting

mod attendance;
mod clock;
mod coordinator;
mod error;
mod executor;
mod filter;
mod monitor;
mod planner;
mod retry;
mod supervisor;

pub use attendance::*;
pub use clock::*;
pub use coordinator::*;
pub use error::*;
pub use executor::*;
pub use filter::*;
pub use monitor::*;
pub use planner::*;
pub use retry::*;
pub use supervisor::*;
