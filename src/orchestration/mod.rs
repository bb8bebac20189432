//! # Orchestration
//!
//! The batch transition saga: a conditional store write (the durable fact)
//! followed by a best-effort notification, with bounded compensation when
//! the notification fails.
//!
//! - [`transition_driver::BatchTransitionService`]: transitions, creation, reads
//! - [`compensator::Compensator`]: retried revert/remove writes
//! - [`bootstrap::bootstrap`]: wiring from configuration

pub mod bootstrap;
pub mod compensator;
pub mod transition_driver;

pub use bootstrap::{bootstrap, BootstrapError};
pub use compensator::{CompensationOutcome, Compensator};
pub use transition_driver::BatchTransitionService;
