//! Sink implementations
//!
//! Contains AmplifierSink, StreamBusSink, and DiagnosticSink.

mod amplifier;
mod diagnostic;
mod stream_bus;

pub use self::amplifier::AmplifierSink;
pub use self::diagnostic::DiagnosticSink;
pub use self::stream_bus::{BusMessage, StreamBusSink, StreamInfo};
