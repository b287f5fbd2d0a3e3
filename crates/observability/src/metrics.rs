//! Trigger bridge 指标收集模块
//!
//! Prometheus-facing recorders plus an in-memory aggregator used for the
//! shutdown summary.

use metrics::{counter, gauge, histogram};

/// 记录触发事件进入系统
///
/// `path` is the ingestion path: `listener`, `queue` or `startup`.
pub fn record_trigger_received(path: &str) {
    counter!(
        "trigger_bridge_triggers_received_total",
        "path" => path.to_string()
    )
    .increment(1);
}

/// 记录单个 sink 的分发结果
pub fn record_trigger_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "trigger_bridge_triggers_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录一次完整 fan-out 的耗时 (从采集到所有 sink 返回)
pub fn record_dispatch_latency_ms(latency_ms: f64) {
    histogram!("trigger_bridge_dispatch_latency_ms").record(latency_ms);
}

/// 记录时钟同步结果
pub fn record_sync(diff_ms: f64, rounds: u32) {
    gauge!("trigger_bridge_amplifier_sync_diff_ms").set(diff_ms);
    gauge!("trigger_bridge_amplifier_sync_rounds").set(rounds as f64);
    histogram!("trigger_bridge_amplifier_sync_diff_ms_hist").record(diff_ms);
}

/// 记录被容忍的放大器应答不匹配
pub fn record_response_mismatch(command: &str) {
    counter!(
        "trigger_bridge_amplifier_response_mismatch_total",
        "command" => command.to_string()
    )
    .increment(1);
}

/// 记录监听会话结束
pub fn record_listener_session(triggers: u64) {
    counter!("trigger_bridge_listener_sessions_total").increment(1);
    histogram!("trigger_bridge_listener_session_triggers").record(triggers as f64);
}

/// 记录队列深度
pub fn record_queue_depth(depth: usize) {
    gauge!("trigger_bridge_queue_depth").set(depth as f64);
}

/// 分发指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DispatchMetricsAggregator {
    /// Fan-outs performed
    pub total_triggers: u64,

    /// Fan-outs where at least one sink failed
    pub triggers_with_failures: u64,

    /// Failures per sink
    pub sink_failures: std::collections::HashMap<String, u64>,

    /// Fan-out latency (ms)
    pub latency_stats: RunningStats,

    /// Sync diff per synchronization (ms)
    pub sync_stats: RunningStats,
}

impl DispatchMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新一次 fan-out 的统计
    pub fn update<'a>(&mut self, latency_ms: f64, failed_sinks: impl IntoIterator<Item = &'a str>) {
        self.total_triggers += 1;
        self.latency_stats.push(latency_ms);

        let mut failed = false;
        for sink in failed_sinks {
            failed = true;
            *self.sink_failures.entry(sink.to_string()).or_insert(0) += 1;
        }
        if failed {
            self.triggers_with_failures += 1;
        }
    }

    /// 记录一次同步
    pub fn update_sync(&mut self, diff_ms: f64) {
        self.sync_stats.push(diff_ms);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_triggers: self.total_triggers,
            triggers_with_failures: self.triggers_with_failures,
            failure_rate: if self.total_triggers > 0 {
                self.triggers_with_failures as f64 / self.total_triggers as f64 * 100.0
            } else {
                0.0
            },
            latency_ms: StatsSummary::from(&self.latency_stats),
            sync_diff_ms: StatsSummary::from(&self.sync_stats),
            sink_failures: self.sink_failures.clone(),
        }
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_triggers: u64,
    pub triggers_with_failures: u64,
    pub failure_rate: f64,
    pub latency_ms: StatsSummary,
    pub sync_diff_ms: StatsSummary,
    pub sink_failures: std::collections::HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Trigger Bridge Summary ===")?;
        writeln!(f, "Total triggers: {}", self.total_triggers)?;
        writeln!(
            f,
            "Triggers with sink failures: {} ({:.2}%)",
            self.triggers_with_failures, self.failure_rate
        )?;
        writeln!(f, "Dispatch latency (ms): {}", self.latency_ms)?;
        writeln!(f, "Amplifier sync diff (ms): {}", self.sync_diff_ms)?;

        if !self.sink_failures.is_empty() {
            writeln!(f, "Failures per sink:")?;
            for (sink, count) in &self.sink_failures {
                writeln!(f, "  {}: {}", sink, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_counts_failed_fanouts_once() {
        let mut aggregator = DispatchMetricsAggregator::new();

        aggregator.update(0.4, []);
        aggregator.update(1.2, ["stream_bus", "diagnostic"]);
        aggregator.update(0.8, ["stream_bus"]);

        assert_eq!(aggregator.total_triggers, 3);
        assert_eq!(aggregator.triggers_with_failures, 2);
        assert_eq!(aggregator.sink_failures.get("stream_bus"), Some(&2));
        assert_eq!(aggregator.sink_failures.get("diagnostic"), Some(&1));
        assert_eq!(aggregator.latency_stats.count(), 3);
    }

    #[test]
    fn test_summary_display() {
        let summary = MetricsSummary {
            total_triggers: 200,
            triggers_with_failures: 10,
            failure_rate: 5.0,
            latency_ms: StatsSummary {
                count: 200,
                min: 0.2,
                max: 3.0,
                mean: 0.7,
                std_dev: 0.3,
            },
            sync_diff_ms: StatsSummary::default(),
            sink_failures: HashMap::new(),
        };

        let output = format!("{}", summary);
        assert!(output.contains("Total triggers: 200"));
        assert!(output.contains("5.00%"));
        assert!(output.contains("Amplifier sync diff (ms): N/A"));
    }
}
