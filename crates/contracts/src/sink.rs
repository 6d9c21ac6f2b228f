//! EventSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for Sinks.

use crate::{ContractError, SessionEvent};

/// Event output trait
///
/// All sink implementations must implement this trait. A sink is driven by a
/// single worker task, so implementations never see concurrent calls.
#[trait_variant::make(EventSink: Send)]
pub trait LocalEventSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one session event
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, event: &SessionEvent) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
