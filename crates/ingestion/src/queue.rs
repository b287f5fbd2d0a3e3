//! TriggerQueue - multi-producer FIFO with bounded-wait pops
//!
//! Closing is one-way and stops the consumer immediately: pops return `None`
//! from then on, even if events were still pending.

use std::sync::Arc;
use std::time::Duration;

use async_channel::{unbounded, Receiver, Sender};
use contracts::{QueueConfig, TriggerCode, TriggerEvent};
use metrics::counter;
use tracing::{debug, trace};

use crate::metrics::IngestionMetrics;

/// Trigger queue
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct TriggerQueue {
    tx: Sender<TriggerEvent>,
    rx: Receiver<TriggerEvent>,
    pop_timeout: Duration,
    metrics: Arc<IngestionMetrics>,
}

impl Default for TriggerQueue {
    fn default() -> Self {
        Self::new(&QueueConfig::default())
    }
}

impl TriggerQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self::with_timeout(config.pop_timeout())
    }

    pub fn with_timeout(pop_timeout: Duration) -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            pop_timeout,
            metrics: Arc::new(IngestionMetrics::new()),
        }
    }

    /// Push an event; `false` once the queue is closed
    ///
    /// Never blocks, so it can be called from plain threads.
    pub fn enqueue(&self, event: TriggerEvent) -> bool {
        if self.tx.try_send(event).is_err() {
            self.metrics.record_rejected();
            counter!("trigger_bridge_queue_rejected_total").increment(1);
            trace!(code = event.code, "Enqueue after close rejected");
            return false;
        }
        self.metrics.record_enqueued();
        observability::record_trigger_received("queue");
        self.update_depth();
        true
    }

    /// Stamp `code` with the current instant and push it
    pub fn enqueue_code(&self, code: TriggerCode) -> bool {
        self.enqueue(TriggerEvent::now(code))
    }

    /// Pop with the configured timeout
    pub async fn pop(&self) -> Option<TriggerEvent> {
        self.try_pop(self.pop_timeout).await
    }

    /// Wait up to `timeout` for the next event
    ///
    /// Returns `None` on timeout or once the queue is closed.
    pub async fn try_pop(&self, timeout: Duration) -> Option<TriggerEvent> {
        if self.is_closed() {
            return None;
        }

        let event = match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(_)) | Err(_) => return None,
        };

        if self.is_closed() {
            self.metrics.record_discarded();
            return None;
        }

        self.metrics.record_popped();
        self.update_depth();
        Some(event)
    }

    /// Close the queue; producers and the consumer see it at once
    pub fn close(&self) {
        if self.tx.close() {
            debug!(pending = self.rx.len(), "Trigger queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Events currently waiting
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn pop_timeout(&self) -> Duration {
        self.pop_timeout
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    fn update_depth(&self) {
        let depth = self.rx.len();
        self.metrics.update_queue_len(depth);
        observability::record_queue_depth(depth);
    }
}
