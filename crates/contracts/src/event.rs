//! TriggerEvent - the unit of data flowing through the bridge

use std::sync::OnceLock;
use std::time::Instant;

/// Application-defined marker id
///
/// Values `<= 0` are reserved as the end-of-session sentinel on the listener path.
pub type TriggerCode = i8;

/// A single trigger occurrence
///
/// The timestamp is captured when the trigger enters the bridge and is never
/// modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Marker id
    pub code: TriggerCode,
    /// Monotonic capture instant
    pub timestamp: Instant,
}

impl TriggerEvent {
    /// Create an event stamped with the current instant
    pub fn now(code: TriggerCode) -> Self {
        Self::at(code, Instant::now())
    }

    /// Create an event with an explicit capture instant
    pub fn at(code: TriggerCode, timestamp: Instant) -> Self {
        Self { code, timestamp }
    }

    /// Whether this code ends a listener session instead of being forwarded
    pub fn is_sentinel(&self) -> bool {
        self.code <= 0
    }

    /// The code rendered as the raw byte character it arrived as
    pub fn code_char(&self) -> char {
        char::from(self.code as u8)
    }
}

/// Process-wide monotonic clock origin, fixed on first use
pub fn clock_origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

/// Seconds elapsed between the process clock origin and `instant`
///
/// Instants earlier than the origin map to `0.0`.
pub fn monotonic_seconds(instant: Instant) -> f64 {
    instant.saturating_duration_since(clock_origin()).as_secs_f64()
}
