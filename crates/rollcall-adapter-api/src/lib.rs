//! Collaborator trait interfaces for rollcalld
//!
//! This crate defines the boundary between the scheduling core and the
//! outside world: the calendar feed, the browser agent, the messaging
//! platform and the credential source. It contains no network code itself.
//! Mock implementations live next to the traits for use in tests.

mod credentials;
mod errors;
mod handle;
mod mock;
mod traits;

pub use credentials::*;
pub use errors::*;
pub use handle::*;
pub use mock::*;
pub use traits::*;
