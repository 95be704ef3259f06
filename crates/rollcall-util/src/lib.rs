//! Shared utilities for rollcall
//!
//! This crate provides:
//! - ID types (SessionId, ChannelId, ThreadId)
//! - Wall-clock helpers (mock time, formatting, parsing)
//! - Error types
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
