//! # Integration Tests
//!
//! End-to-end tests across crates, run against the mock amplifier.
//!
//! Covers:
//! - Config file -> loader -> dispatcher wiring
//! - Listener and queue paths feeding one dispatcher
//! - Streaming-bus datagrams observed from a local UDP socket

#[cfg(test)]
mod contract_tests {
    use contracts::BridgeConfig;

    #[test]
    fn test_default_config_survives_loader() {
        let toml = config_loader::ConfigLoader::to_toml(&BridgeConfig::default()).unwrap();
        let config = config_loader::ConfigLoader::load_from_str(
            &toml,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.amplifier.address(), "127.0.0.1:55513");
        assert_eq!(config.listener.port, 2000);
        assert!(config.startup_test_triggers);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::time::Duration;

    use amplifier::{MockAmplifier, MockAmplifierConfig};
    use contracts::{BridgeConfig, ListenerConfig, StreamFormat, TriggerEvent};
    use dispatcher::{BusMessage, DispatcherBuilder, MockSink, SharedDispatcher};
    use ingestion::{GeneratorSource, SourceContainer, TriggerListener, TriggerPump, TriggerQueue};
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpStream, UdpSocket};
    use tokio::sync::oneshot;

    /// Config pointing at the mock amplifier, with no optional sinks
    fn bridge_config(amp: &MockAmplifier) -> BridgeConfig {
        let mut config = BridgeConfig {
            amplifier: amp.amplifier_config(),
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

    /// Poll `condition` every 10 ms for up to five seconds
    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn amp_codes(amp: &MockAmplifier) -> Vec<i32> {
        amp.triggers().iter().map(|t| t.code).collect()
    }

    /// End-to-end test: TCP bytes -> TriggerListener -> Dispatcher -> amplifier
    #[tokio::test]
    async fn test_e2e_listener_to_amplifier() {
        let amp = MockAmplifier::start(MockAmplifierConfig::default())
            .await
            .unwrap();
        let calls = MockSink::call_log();
        let config = bridge_config(&amp);

        let dispatcher = DispatcherBuilder::new(config.clone())
            .with_sink(MockSink::new("probe", calls.clone()))
            .build()
            .await
            .unwrap();
        assert_eq!(dispatcher.sink_names(), vec!["amplifier", "probe"]);
        assert!(amp.sync_rounds() >= 1);
        let dispatcher = SharedDispatcher::new(dispatcher);

        let listener = TriggerListener::bind(&config.listener, dispatcher.clone())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(listener.run_until(async {
            let _ = stop_rx.await;
        }));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&[65, 66, 0, 67]).await.unwrap();
        drop(client);

        wait_until(|| amp.triggers().len() >= 2).await;
        assert_eq!(amp_codes(&amp), vec![65, 66]);

        let probe: Vec<i8> = calls.lock().unwrap().iter().map(|(_, e)| e.code).collect();
        assert_eq!(probe, vec![65, 66]);

        let _ = stop_tx.send(());
        server.await.unwrap();
        dispatcher.close().await.unwrap();
        amp.wait_for_disconnect().await;
        assert_eq!(amp.commands().last(), Some(&b'X'));
    }

    /// End-to-end test: background source -> TriggerQueue -> TriggerPump -> amplifier
    #[tokio::test]
    async fn test_e2e_queue_to_amplifier() {
        let amp = MockAmplifier::start(MockAmplifierConfig::default())
            .await
            .unwrap();
        let config = bridge_config(&amp);
        let dispatcher = SharedDispatcher::new(
            DispatcherBuilder::new(config.clone()).build().await.unwrap(),
        );

        let queue = TriggerQueue::with_timeout(Duration::from_millis(20));
        let mut sources = SourceContainer::new(queue.clone());
        sources
            .add_source(GeneratorSource::sequence(
                "seq",
                vec![10, 20, 30],
                Duration::from_millis(5),
            ))
            .unwrap();
        let pump = TriggerPump::new(queue.clone(), dispatcher.clone()).spawn();

        wait_until(|| amp.triggers().len() >= 3).await;
        sources.shutdown();
        let stats = pump.await.unwrap();

        assert_eq!(amp_codes(&amp), vec![10, 20, 30]);
        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.failed, 0);
        assert!(!queue.enqueue(TriggerEvent::now(40)));

        let guard = dispatcher.lock().await;
        assert_eq!(guard.metrics()[0].1.trigger_count, 3);
    }

    /// A failing extra sink does not stop the amplifier from receiving triggers
    #[tokio::test]
    async fn test_e2e_failing_sink_isolated() {
        let amp = MockAmplifier::start(MockAmplifierConfig::default())
            .await
            .unwrap();
        let calls = MockSink::call_log();
        let dispatcher = SharedDispatcher::new(
            DispatcherBuilder::new(bridge_config(&amp))
                .with_sink(MockSink::failing("broken", calls.clone()))
                .build()
                .await
                .unwrap(),
        );

        assert!(dispatcher.trigger(3).await.is_err());
        assert!(dispatcher.trigger(4).await.is_err());

        assert_eq!(amp_codes(&amp), vec![3, 4]);
        assert_eq!(calls.lock().unwrap().len(), 2);

        let guard = dispatcher.lock().await;
        let summary = guard.summary();
        assert_eq!(summary.total_triggers, 2);
    }

    /// Streaming-bus outlet announces itself and carries each trigger as a sample
    #[tokio::test]
    async fn test_e2e_stream_bus_datagrams() {
        let amp = MockAmplifier::start(MockAmplifierConfig::default())
            .await
            .unwrap();
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut config = bridge_config(&amp);
        config.stream_bus.enabled = true;
        config.stream_bus.target = receiver.local_addr().unwrap().to_string();
        config.stream_bus.format = StreamFormat::Json;

        let mut dispatcher = DispatcherBuilder::new(config).build().await.unwrap();
        assert_eq!(dispatcher.sink_names(), vec!["amplifier", "stream_bus:egisync"]);

        let mut buf = [0u8; 1024];
        let n = tokio::time::timeout(Duration::from_secs(5), receiver.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        match BusMessage::decode(&buf[..n], StreamFormat::Json).unwrap() {
            BusMessage::Announce(info) => {
                assert_eq!(info.name, "egisync");
                assert_eq!(info.stream_type, "trigger");
                assert_eq!(info.channel_count, 1);
            }
            other => panic!("expected announcement, got {:?}", other),
        }

        dispatcher.trigger(65).await.unwrap();
        let n = tokio::time::timeout(Duration::from_secs(5), receiver.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        match BusMessage::decode(&buf[..n], StreamFormat::Json).unwrap() {
            BusMessage::Sample { stream, values, .. } => {
                assert_eq!(stream, "egisync");
                assert_eq!(values, vec!["A".to_string()]);
            }
            other => panic!("expected sample, got {:?}", other),
        }

        dispatcher.close().await.unwrap();
    }

    /// The amplifier sink is mandatory: no amplifier, no dispatcher
    #[tokio::test]
    async fn test_e2e_amplifier_unreachable() {
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let mut config = BridgeConfig::default();
        config.amplifier.port = port;
        config.stream_bus.enabled = false;
        config.diagnostic.enabled = false;

        assert!(DispatcherBuilder::new(config).build().await.is_err());
    }
}
