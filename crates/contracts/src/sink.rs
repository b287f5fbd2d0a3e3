//! TriggerSink trait - Dispatcher output interface
//!
//! Defines the abstract interface every trigger recipient implements.

use crate::{ContractError, TriggerEvent};

/// Trigger recipient trait
///
/// All sink implementations must implement this trait. Calls may block for as
/// long as the underlying transport needs (e.g. an amplifier acknowledgment).
#[trait_variant::make(TriggerSink: Send)]
pub trait LocalTriggerSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one trigger
    ///
    /// # Errors
    /// Returns the delivery error (should include context)
    async fn trigger(&mut self, event: TriggerEvent) -> Result<(), ContractError>;

    /// Release the sink's resources
    async fn close(&mut self) -> Result<(), ContractError>;
}
