//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the trigger bridge.
//! Business crates depend on this crate only, never on each other's internals.
//!
//! ## Time Model
//! - Every trigger carries the monotonic [`std::time::Instant`] captured at ingestion
//! - The amplifier link re-expresses that instant relative to its own sync epoch
//! - Other sinks use [`monotonic_seconds`] (seconds since the process clock origin)

mod config;
mod error;
mod event;
mod sink;

pub use config::*;
pub use error::*;
pub use event::*;
pub use sink::*;
