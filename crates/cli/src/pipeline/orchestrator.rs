//! Bridge orchestrator - coordinates all components.
//!
//! Startup order: amplifier and sinks, startup test triggers, listener bind,
//! sources and pump. Shutdown runs in reverse once the shutdown future fires.

use std::future::Future;
use std::time::{Duration, Instant};

use contracts::{BridgeConfig, TriggerCode};
use dispatcher::{DispatcherBuilder, SharedDispatcher};
use ingestion::{
    GeneratorSource, ReaderSource, SourceContainer, TriggerListener, TriggerPump, TriggerQueue,
};
use tracing::{info, warn};

use super::BridgeStats;
use crate::error::{CliError, Result};

/// Codes sent right after startup, one second apart
const STARTUP_TEST_TRIGGERS: [TriggerCode; 2] = [1, 2];

/// Queue-fed sources to start
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Read triggers from standard input
    pub stdin: bool,
    /// Periodic code and its period
    pub heartbeat: Option<(TriggerCode, Duration)>,
}

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub config: BridgeConfig,
    pub sources: SourceOptions,
}

/// Main bridge orchestrator
pub struct Bridge {
    options: BridgeOptions,
}

impl Bridge {
    pub fn new(options: BridgeOptions) -> Self {
        Self { options }
    }

    /// Run until `shutdown` completes
    pub async fn run<F>(self, shutdown: F) -> Result<BridgeStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let config = &self.options.config;

        info!(address = %config.amplifier.address(), "Connecting to amplifier...");
        let dispatcher = DispatcherBuilder::new(config.clone()).build().await?;
        let dispatcher = SharedDispatcher::new(dispatcher);

        if config.startup_test_triggers {
            send_test_triggers(&dispatcher).await;
        }

        let listener = TriggerListener::bind(&config.listener, dispatcher.clone()).await?;

        let queue = TriggerQueue::new(&config.queue);
        let mut sources = SourceContainer::new(queue.clone());
        if let Err(e) = self.start_sources(&mut sources) {
            sources.shutdown_async().await;
            return Err(e);
        }
        let pump = TriggerPump::new(queue.clone(), dispatcher.clone()).spawn();

        info!(
            port = config.listener.port,
            "Listening on port {} for triggers", config.listener.port
        );
        listener.run_until(shutdown).await;

        warn!("Shutting down bridge...");
        sources.shutdown_async().await;
        let pump_stats = pump
            .await
            .map_err(|e| CliError::shutdown(format!("trigger pump panicked: {e}")))?;

        if let Err(e) = dispatcher.close().await {
            warn!(error = %e, "Closing sinks failed");
        }

        let guard = dispatcher.lock().await;
        Ok(BridgeStats {
            duration: start_time.elapsed(),
            pump: pump_stats,
            queue: queue.metrics().snapshot(),
            sinks: guard.metrics(),
            dispatch: guard.summary(),
        })
    }

    fn start_sources(&self, sources: &mut SourceContainer) -> Result<()> {
        let options = &self.options.sources;
        if options.stdin {
            sources.add_source(ReaderSource::stdin())?;
        }
        if let Some((code, interval)) = options.heartbeat {
            sources.add_source(GeneratorSource::periodic("heartbeat", code, interval))?;
        }
        Ok(())
    }
}

async fn send_test_triggers(dispatcher: &SharedDispatcher) {
    info!("Sending test triggers");
    for (i, code) in STARTUP_TEST_TRIGGERS.into_iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        observability::record_trigger_received("startup");
        if let Err(e) = dispatcher.trigger(code).await {
            warn!(code, error = %e, "Test trigger failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amplifier::{AmplifierError, MockAmplifier, MockAmplifierConfig};
    use contracts::ListenerConfig;
    use dispatcher::DispatcherError;

    fn quiet_config(amplifier: contracts::AmplifierConfig) -> BridgeConfig {
        let mut config = BridgeConfig {
            startup_test_triggers: false,
            amplifier,
            listener: ListenerConfig {
                bind_addr: "127.0.0.1".to_string(),
                port: 0,
            },
            ..Default::default()
        };
        config.stream_bus.enabled = false;
        config.diagnostic.enabled = false;
        config
    }

    async fn run_once(config: BridgeConfig) -> Result<BridgeStats> {
        Bridge::new(BridgeOptions {
            config,
            sources: SourceOptions::default(),
        })
        .run(std::future::ready(()))
        .await
    }

    #[tokio::test]
    async fn test_handshake_failure_stays_a_protocol_error() {
        let amp = MockAmplifier::start(MockAmplifierConfig {
            handshake_response: b'F',
            ..Default::default()
        })
        .await
        .unwrap();

        let err = run_once(quiet_config(amp.amplifier_config()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Dispatcher(DispatcherError::Amplifier(AmplifierError::Protocol(_)))
        ));
        assert!(err.to_string().contains("70 / 0x46"), "{err}");
    }

    #[tokio::test]
    async fn test_unreachable_amplifier_is_a_connection_error() {
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let amplifier = contracts::AmplifierConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        };

        let err = run_once(quiet_config(amplifier)).await.unwrap_err();
        assert!(matches!(
            err,
            CliError::Dispatcher(DispatcherError::Amplifier(AmplifierError::Connection { .. }))
        ));
    }

    #[tokio::test]
    async fn test_immediate_shutdown_closes_amplifier() {
        let amp = MockAmplifier::start(MockAmplifierConfig::default())
            .await
            .unwrap();

        let stats = run_once(quiet_config(amp.amplifier_config())).await.unwrap();
        assert_eq!(stats.dispatch.total_triggers, 0);
        assert_eq!(stats.sinks.len(), 1);

        amp.wait_for_disconnect().await;
        assert_eq!(amp.commands().last(), Some(&b'X'));
    }
}
