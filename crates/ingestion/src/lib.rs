//! # Ingestion
//!
//! Trigger ingestion module.
//!
//! Responsibilities:
//! - `TriggerQueue`: multi-producer FIFO with bounded-wait pops and one-way close
//! - Background sources on their own threads (`SourceContainer`)
//! - `TriggerPump`: drains the queue into the dispatcher
//! - `TriggerListener`: raw-byte TCP input, dispatched directly
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{GeneratorSource, SourceContainer, TriggerPump, TriggerQueue};
//!
//! let queue = TriggerQueue::new(&config.queue);
//! let mut sources = SourceContainer::new(queue.clone());
//! sources.add_source(GeneratorSource::periodic("tick", 1, Duration::from_secs(1)))?;
//!
//! let pump = TriggerPump::new(queue, dispatcher.clone()).spawn();
//! // ...
//! sources.shutdown();
//! let stats = pump.await?;
//! ```

mod error;
mod listener;
mod metrics;
mod pump;
mod queue;
mod source;

// Re-exports
pub use error::{IngestionError, Result};
pub use listener::{SessionEnd, TriggerListener};
pub use crate::metrics::{IngestionMetrics, MetricsSnapshot};
pub use pump::{PumpStats, TriggerPump};
pub use queue::TriggerQueue;
pub use source::{GeneratorSource, ReaderSource, SourceContainer, SourceContext, TriggerSource};
