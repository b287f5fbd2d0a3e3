//! Dispatcher - ordered fan-out of triggers to sinks

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

use contracts::{
    BridgeConfig, ContractError, FailurePolicy, TriggerCode, TriggerEvent, TriggerSink,
};
use observability::{DispatchMetricsAggregator, MetricsSummary};

use crate::error::{DispatcherError, SinkFailure};
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::sinks::{AmplifierSink, DiagnosticSink, StreamBusSink};

type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ContractError>> + Send + 'a>>;

/// Object-safe view of a [`TriggerSink`]
///
/// Every `TriggerSink` gets this for free; the registry stores sinks as
/// `Box<dyn DynTriggerSink>`.
pub trait DynTriggerSink: Send {
    fn name(&self) -> &str;
    fn trigger(&mut self, event: TriggerEvent) -> SinkFuture<'_>;
    fn close(&mut self) -> SinkFuture<'_>;
}

impl<S> DynTriggerSink for S
where
    S: TriggerSink + 'static,
{
    fn name(&self) -> &str {
        TriggerSink::name(self)
    }

    fn trigger(&mut self, event: TriggerEvent) -> SinkFuture<'_> {
        Box::pin(TriggerSink::trigger(self, event))
    }

    fn close(&mut self) -> SinkFuture<'_> {
        Box::pin(TriggerSink::close(self))
    }
}

struct RegisteredSink {
    sink: Box<dyn DynTriggerSink>,
    metrics: Arc<SinkMetrics>,
}

/// Owns the sink registry; registration order is dispatch order
pub struct TriggerDispatcher {
    sinks: Vec<RegisteredSink>,
    policy: FailurePolicy,
    aggregator: DispatchMetricsAggregator,
}

impl Default for TriggerDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerDispatcher {
    /// Empty dispatcher isolating sink failures
    pub fn new() -> Self {
        Self::with_policy(FailurePolicy::default())
    }

    pub fn with_policy(policy: FailurePolicy) -> Self {
        Self {
            sinks: Vec::new(),
            policy,
            aggregator: DispatchMetricsAggregator::new(),
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Append a sink to the registry
    pub fn register<S>(&mut self, sink: S)
    where
        S: TriggerSink + 'static,
    {
        self.register_boxed(Box::new(sink));
    }

    pub fn register_boxed(&mut self, sink: Box<dyn DynTriggerSink>) {
        info!(sink = %sink.name(), position = self.sinks.len(), "Registered sink");
        self.sinks.push(RegisteredSink {
            sink,
            metrics: Arc::new(SinkMetrics::new()),
        });
    }

    /// Register the sink if its construction succeeded
    ///
    /// A construction error is logged and the sink is skipped. Returns
    /// whether the sink was registered.
    pub fn try_register<S, E>(&mut self, sink: Result<S, E>) -> bool
    where
        S: TriggerSink + 'static,
        E: std::fmt::Display,
    {
        match sink {
            Ok(sink) => {
                self.register(sink);
                true
            }
            Err(e) => {
                warn!(error = %e, "Error adding sink");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Sink names in dispatch order
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.sink.name()).collect()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.sinks
            .iter()
            .map(|s| (s.sink.name().to_string(), s.metrics.snapshot()))
            .collect()
    }

    /// Feed an amplifier synchronization result into the summary
    pub fn record_sync(&mut self, diff_ms: f64) {
        self.aggregator.update_sync(diff_ms);
    }

    /// Aggregated dispatch statistics since start
    pub fn summary(&self) -> MetricsSummary {
        self.aggregator.summary()
    }

    /// Stamp `code` with the current instant and dispatch it
    pub async fn trigger(&mut self, code: TriggerCode) -> Result<(), DispatcherError> {
        self.dispatch(TriggerEvent::now(code)).await
    }

    /// Dispatch `code` with a capture instant taken elsewhere
    pub async fn trigger_at(
        &mut self,
        code: TriggerCode,
        timestamp: Instant,
    ) -> Result<(), DispatcherError> {
        self.dispatch(TriggerEvent::at(code, timestamp)).await
    }

    /// Hand the same event to every sink, one after another
    ///
    /// Under [`FailurePolicy::Isolate`] every sink is invoked and all
    /// failures come back together; under [`FailurePolicy::FailFast`] the
    /// first failure stops the fan-out.
    #[instrument(
        name = "dispatcher_dispatch",
        skip(self, event),
        fields(code = event.code, sinks = self.sinks.len())
    )]
    pub async fn dispatch(&mut self, event: TriggerEvent) -> Result<(), DispatcherError> {
        let started = Instant::now();
        let mut failures = Vec::new();

        for registered in &mut self.sinks {
            let sink_started = Instant::now();
            let result = registered.sink.trigger(event).await;
            let elapsed_us = sink_started.elapsed().as_micros() as u64;
            let name = registered.sink.name();

            registered.metrics.record(result.is_ok(), elapsed_us);
            observability::record_trigger_dispatched(name, result.is_ok());

            if let Err(error) = result {
                warn!(sink = %name, error = %error, "Sink failed to handle trigger");
                failures.push(SinkFailure {
                    sink_name: name.to_string(),
                    error,
                });
                if self.policy == FailurePolicy::FailFast {
                    break;
                }
            }
        }

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        observability::record_dispatch_latency_ms(latency_ms);
        self.aggregator
            .update(latency_ms, failures.iter().map(|f| f.sink_name.as_str()));

        if failures.is_empty() {
            debug!(latency_ms, "Trigger dispatched");
            Ok(())
        } else {
            Err(DispatcherError::SinkFailures { failures })
        }
    }

    /// Close every sink in registration order
    ///
    /// All sinks are closed even when some fail; the first error is returned.
    #[instrument(name = "dispatcher_close", skip(self))]
    pub async fn close(&mut self) -> Result<(), DispatcherError> {
        let mut first_error = None;
        for registered in &mut self.sinks {
            if let Err(e) = registered.sink.close().await {
                warn!(sink = %registered.sink.name(), error = %e, "Sink close failed");
                first_error.get_or_insert(e);
            }
        }
        info!(sinks = self.sinks.len(), "Dispatcher closed");
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Dispatcher shared between the listener and the queue pump
///
/// The mutex makes every fan-out atomic with respect to the other callers.
#[derive(Clone)]
pub struct SharedDispatcher {
    inner: Arc<Mutex<TriggerDispatcher>>,
}

impl SharedDispatcher {
    pub fn new(dispatcher: TriggerDispatcher) -> Self {
        Self {
            inner: Arc::new(Mutex::new(dispatcher)),
        }
    }

    pub async fn dispatch(&self, event: TriggerEvent) -> Result<(), DispatcherError> {
        self.inner.lock().await.dispatch(event).await
    }

    pub async fn trigger(&self, code: TriggerCode) -> Result<(), DispatcherError> {
        self.dispatch(TriggerEvent::now(code)).await
    }

    pub async fn close(&self) -> Result<(), DispatcherError> {
        self.inner.lock().await.close().await
    }

    /// Exclusive access, e.g. to read metrics
    pub async fn lock(&self) -> MutexGuard<'_, TriggerDispatcher> {
        self.inner.lock().await
    }
}

/// Builds the standard sink set from a [`BridgeConfig`]
///
/// Order: amplifier, streaming bus, diagnostic output, then any extra sinks.
pub struct DispatcherBuilder {
    config: BridgeConfig,
    extra: Vec<Box<dyn DynTriggerSink>>,
}

impl DispatcherBuilder {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            extra: Vec::new(),
        }
    }

    /// Append a sink after the configured ones
    pub fn with_sink<S>(mut self, sink: S) -> Self
    where
        S: TriggerSink + 'static,
    {
        self.extra.push(Box::new(sink));
        self
    }

    /// Connect the sinks
    ///
    /// The amplifier is mandatory: failing to connect or synchronize aborts
    /// the build. A streaming-bus outlet that cannot be created is skipped.
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub async fn build(self) -> Result<TriggerDispatcher, DispatcherError> {
        let mut dispatcher = TriggerDispatcher::with_policy(self.config.dispatch.failure_policy);

        let amplifier = AmplifierSink::connect(&self.config.amplifier).await?;
        dispatcher.record_sync(amplifier.last_sync().diff.as_secs_f64() * 1000.0);
        dispatcher.register(amplifier);

        if self.config.stream_bus.enabled {
            dispatcher.try_register(StreamBusSink::new(&self.config.stream_bus).await);
        }

        if self.config.diagnostic.enabled {
            dispatcher.register(DiagnosticSink::stdout());
        }

        for sink in self.extra {
            dispatcher.register_boxed(sink);
        }

        info!(sinks = ?dispatcher.sink_names(), "Dispatcher ready");
        Ok(dispatcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSink;
    use std::time::Duration;

    #[tokio::test]
    async fn test_dispatch_reaches_every_sink_in_order() {
        let calls = MockSink::call_log();
        let mut dispatcher = TriggerDispatcher::new();
        for name in ["a", "b", "c", "d"] {
            dispatcher.register(MockSink::new(name, calls.clone()));
        }

        let event = TriggerEvent::now(42);
        dispatcher.dispatch(event).await.unwrap();

        let calls = calls.lock().unwrap();
        let names: Vec<&str> = calls.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
        assert!(calls.iter().all(|(_, e)| *e == event));
    }

    #[tokio::test]
    async fn test_trigger_stamps_current_instant() {
        let calls = MockSink::call_log();
        let mut dispatcher = TriggerDispatcher::new();
        dispatcher.register(MockSink::new("only", calls.clone()));

        let before = Instant::now();
        dispatcher.trigger(9).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.code, 9);
        assert!(calls[0].1.timestamp >= before);
    }

    #[tokio::test]
    async fn test_trigger_at_keeps_given_instant() {
        let calls = MockSink::call_log();
        let mut dispatcher = TriggerDispatcher::new();
        dispatcher.register(MockSink::new("a", calls.clone()));
        dispatcher.register(MockSink::new("b", calls.clone()));

        let captured = Instant::now() - Duration::from_millis(250);
        dispatcher.trigger_at(12, captured).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls
            .iter()
            .all(|(_, e)| *e == TriggerEvent::at(12, captured)));
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let calls = MockSink::call_log();
        let mut dispatcher = TriggerDispatcher::new();
        dispatcher.register(MockSink::new("first", calls.clone()));
        dispatcher.register(MockSink::failing("broken", calls.clone()));
        dispatcher.register(MockSink::new("last", calls.clone()));

        let err = dispatcher.trigger(3).await.unwrap_err();
        assert_eq!(err.failed_sinks(), vec!["broken"]);
        assert_eq!(calls.lock().unwrap().len(), 3);

        let metrics = dispatcher.metrics();
        assert_eq!(metrics[1].1.failure_count, 1);
        assert_eq!(metrics[2].1.trigger_count, 1);

        let summary = dispatcher.summary();
        assert_eq!(summary.total_triggers, 1);
        assert_eq!(summary.triggers_with_failures, 1);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_failure() {
        let calls = MockSink::call_log();
        let mut dispatcher = TriggerDispatcher::with_policy(FailurePolicy::FailFast);
        dispatcher.register(MockSink::new("first", calls.clone()));
        dispatcher.register(MockSink::failing("broken", calls.clone()));
        dispatcher.register(MockSink::new("never", calls.clone()));

        assert!(dispatcher.trigger(3).await.is_err());
        let names: Vec<String> = calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, ["first", "broken"]);
    }

    #[tokio::test]
    async fn test_try_register_skips_failed_construction() {
        let calls = MockSink::call_log();
        let mut dispatcher = TriggerDispatcher::new();

        assert!(dispatcher.try_register(Ok::<_, ContractError>(MockSink::new("ok", calls.clone()))));
        assert!(!dispatcher.try_register(Err::<MockSink, _>(ContractError::Other(
            "no outlet".into()
        ))));
        assert_eq!(dispatcher.sink_names(), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_shared_dispatch_does_not_interleave() {
        let calls = MockSink::call_log();
        let mut dispatcher = TriggerDispatcher::new();
        dispatcher.register(
            MockSink::new("slow", calls.clone()).with_delay(Duration::from_millis(5)),
        );
        dispatcher.register(MockSink::new("fast", calls.clone()));
        let shared = SharedDispatcher::new(dispatcher);

        let a = tokio::spawn({
            let shared = shared.clone();
            async move { shared.trigger(1).await }
        });
        let b = tokio::spawn({
            let shared = shared.clone();
            async move { shared.trigger(2).await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let calls = calls.lock().unwrap();
        let codes: Vec<i8> = calls.iter().map(|(_, e)| e.code).collect();
        assert_eq!(codes.len(), 4);
        assert_eq!(codes[0], codes[1]);
        assert_eq!(codes[2], codes[3]);
    }
}
