//! Sink metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for a single registered sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Total successful triggers
    trigger_count: AtomicU64,
    /// Total trigger failures
    failure_count: AtomicU64,
    /// Accumulated time spent inside the sink (microseconds)
    busy_us: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger_count(&self) -> u64 {
        self.trigger_count.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn busy_us(&self) -> u64 {
        self.busy_us.load(Ordering::Relaxed)
    }

    /// Record the outcome of one trigger call
    pub fn record(&self, success: bool, elapsed_us: u64) {
        if success {
            self.trigger_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        self.busy_us.fetch_add(elapsed_us, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            trigger_count: self.trigger_count(),
            failure_count: self.failure_count(),
            busy_us: self.busy_us(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub trigger_count: u64,
    pub failure_count: u64,
    pub busy_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_splits_success_and_failure() {
        let metrics = SinkMetrics::new();
        metrics.record(true, 10);
        metrics.record(true, 5);
        metrics.record(false, 1);

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                trigger_count: 2,
                failure_count: 1,
                busy_us: 16,
            }
        );
    }
}
