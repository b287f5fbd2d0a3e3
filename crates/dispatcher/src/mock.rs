//! Mock sink
//!
//! Records every trigger it receives; can be told to fail. Used by tests
//! across the workspace.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{ContractError, TriggerEvent, TriggerSink};

/// Shared log of `(sink name, event)` pairs, in call order
pub type CallLog = Arc<Mutex<Vec<(String, TriggerEvent)>>>;

/// Sink that records triggers into a shared log
pub struct MockSink {
    name: String,
    calls: CallLog,
    should_fail: bool,
    delay: Duration,
}

impl MockSink {
    /// Create a mock sink writing into `calls`
    pub fn new(name: impl Into<String>, calls: CallLog) -> Self {
        Self {
            name: name.into(),
            calls,
            should_fail: false,
            delay: Duration::ZERO,
        }
    }

    /// Create a mock sink that records the call and then fails
    pub fn failing(name: impl Into<String>, calls: CallLog) -> Self {
        Self {
            should_fail: true,
            ..Self::new(name, calls)
        }
    }

    /// Sleep this long inside every trigger call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Create an empty call log
    pub fn call_log() -> CallLog {
        Arc::new(Mutex::new(Vec::new()))
    }
}

impl TriggerSink for MockSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn trigger(&mut self, event: TriggerEvent) -> Result<(), ContractError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().unwrap().push((self.name.clone(), event));
        if self.should_fail {
            return Err(ContractError::sink_write(&self.name, "mock failure"));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}
