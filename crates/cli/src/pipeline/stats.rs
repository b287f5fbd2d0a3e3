//! Bridge statistics printed at shutdown.

use std::time::Duration;

use dispatcher::MetricsSnapshot as SinkSnapshot;
use ingestion::{MetricsSnapshot as QueueSnapshot, PumpStats};
use observability::MetricsSummary;

/// Statistics from a bridge run
#[derive(Debug, Clone)]
pub struct BridgeStats {
    /// Total duration of the run
    pub duration: Duration,

    /// Queue consumer counters
    pub pump: PumpStats,

    /// Queue counters
    pub queue: QueueSnapshot,

    /// Per-sink counters, in dispatch order
    pub sinks: Vec<(String, SinkSnapshot)>,

    /// Fan-out aggregate
    pub dispatch: MetricsSummary,
}

impl BridgeStats {
    /// Print detailed summary
    pub fn print_summary(&self) {
        println!();
        print!("{}", self.dispatch);
        println!("Duration: {:.2}s", self.duration.as_secs_f64());

        println!("\nQueue");
        println!("   ├─ Enqueued: {}", self.queue.enqueued);
        println!("   ├─ Rejected after close: {}", self.queue.rejected);
        println!("   ├─ Dispatched: {}", self.pump.dispatched);
        println!("   └─ Dispatch failures: {}", self.pump.failed);

        if !self.sinks.is_empty() {
            println!("\nSinks");
            let last = self.sinks.len() - 1;
            for (i, (name, snapshot)) in self.sinks.iter().enumerate() {
                let branch = if i == last { "└─" } else { "├─" };
                println!(
                    "   {} {}: {} ok, {} failed",
                    branch, name, snapshot.trigger_count, snapshot.failure_count
                );
            }
        }

        println!();
    }
}
