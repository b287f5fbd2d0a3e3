//! TriggerPump - the queue's single consumer

use dispatcher::SharedDispatcher;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::queue::TriggerQueue;

/// Counters returned when the pump stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub dispatched: u64,
    pub failed: u64,
}

/// Pops events and dispatches them until the queue closes
pub struct TriggerPump {
    queue: TriggerQueue,
    dispatcher: SharedDispatcher,
}

impl TriggerPump {
    pub fn new(queue: TriggerQueue, dispatcher: SharedDispatcher) -> Self {
        Self { queue, dispatcher }
    }

    /// Run the consumer loop
    ///
    /// Each pop waits at most the queue's timeout, so a close is noticed
    /// within that bound.
    #[instrument(name = "trigger_pump_run", skip(self))]
    pub async fn run(self) -> PumpStats {
        info!(pop_timeout = ?self.queue.pop_timeout(), "Trigger pump started");
        let mut stats = PumpStats::default();

        while !self.queue.is_closed() {
            let Some(event) = self.queue.pop().await else {
                continue;
            };

            match self.dispatcher.dispatch(event).await {
                Ok(()) => stats.dispatched += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(code = event.code, error = %e, "Queued trigger dispatch failed");
                }
            }

            if (stats.dispatched + stats.failed).is_multiple_of(100) {
                debug!(dispatched = stats.dispatched, failed = stats.failed, "Pump progress");
            }
        }

        info!(
            dispatched = stats.dispatched,
            failed = stats.failed,
            "Trigger pump stopped"
        );
        stats
    }

    /// Spawn the pump as a background task
    pub fn spawn(self) -> JoinHandle<PumpStats> {
        tokio::spawn(self.run())
    }
}
