//! StreamBusSink - publishes triggers as an irregular-rate string outlet
//!
//! The outlet is announced once, then every trigger becomes one sample
//! datagram. Delivery is UDP fire-and-forget.

use contracts::{
    monotonic_seconds, ContractError, StreamBusConfig, StreamFormat, TriggerEvent, TriggerSink,
};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::{debug, error, info, instrument};

/// Nominal rate announced for streams without a fixed sampling rate
pub const IRREGULAR_RATE: f64 = 0.0;

/// Outlet description sent in the announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    pub stream_type: String,
    pub channel_count: u32,
    pub nominal_srate: f64,
    pub channel_format: String,
    pub source_id: String,
}

impl StreamInfo {
    /// Single-channel string stream at irregular rate
    pub fn trigger_stream(name: &str, stream_type: &str) -> Self {
        Self {
            name: name.to_string(),
            stream_type: stream_type.to_string(),
            channel_count: 1,
            nominal_srate: IRREGULAR_RATE,
            channel_format: "string".to_string(),
            source_id: format!("{}-{}", name, std::process::id()),
        }
    }
}

/// Datagram payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BusMessage {
    /// Outlet creation
    Announce(StreamInfo),
    /// One sample; `timestamp` is seconds on the process monotonic clock
    Sample {
        stream: String,
        timestamp: f64,
        values: Vec<String>,
    },
}

impl BusMessage {
    pub fn encode(&self, format: StreamFormat) -> Result<Vec<u8>, String> {
        match format {
            StreamFormat::Json => serde_json::to_vec(self).map_err(|e| format!("json error: {}", e)),
            StreamFormat::Bincode => {
                bincode::serialize(self).map_err(|e| format!("bincode error: {}", e))
            }
        }
    }

    pub fn decode(data: &[u8], format: StreamFormat) -> Result<Self, String> {
        match format {
            StreamFormat::Json => {
                serde_json::from_slice(data).map_err(|e| format!("json error: {}", e))
            }
            StreamFormat::Bincode => {
                bincode::deserialize(data).map_err(|e| format!("bincode error: {}", e))
            }
        }
    }
}

/// Sink that publishes each trigger on the streaming bus
pub struct StreamBusSink {
    name: String,
    info: StreamInfo,
    format: StreamFormat,
    socket: Option<UdpSocket>,
}

impl StreamBusSink {
    /// Create the outlet and announce it
    #[instrument(name = "stream_bus_sink_new", skip(config), fields(outlet = %config.name, target = %config.target))]
    pub async fn new(config: &StreamBusConfig) -> Result<Self, ContractError> {
        let name = format!("stream_bus:{}", config.name);
        let connection_error = |e: std::io::Error| ContractError::SinkConnection {
            sink_name: name.clone(),
            message: e.to_string(),
        };

        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(connection_error)?;
        socket
            .connect(&config.target)
            .await
            .map_err(connection_error)?;

        let info = StreamInfo::trigger_stream(&config.name, &config.stream_type);
        let announcement = BusMessage::Announce(info.clone())
            .encode(config.format)
            .map_err(|e| ContractError::sink_creation(&name, e))?;
        socket.send(&announcement).await.map_err(connection_error)?;

        info!(outlet = %info.name, "Create stream outlet '{}'", info.name);

        Ok(Self {
            name,
            info,
            format: config.format,
            socket: Some(socket),
        })
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn socket(&self) -> Result<&UdpSocket, ContractError> {
        self.socket
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "outlet closed"))
    }

    fn sample(&self, event: &TriggerEvent) -> BusMessage {
        BusMessage::Sample {
            stream: self.info.name.clone(),
            timestamp: monotonic_seconds(event.timestamp),
            values: vec![event.code_char().to_string()],
        }
    }
}

impl TriggerSink for StreamBusSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn trigger(&mut self, event: TriggerEvent) -> Result<(), ContractError> {
        let socket = self.socket()?;
        let data = self
            .sample(&event)
            .encode(self.format)
            .map_err(|e| ContractError::sink_write(&self.name, e))?;

        match socket.send(&data).await {
            Ok(sent) => debug!(sink = %self.name, code = event.code, bytes = sent, "Sample pushed"),
            // Best-effort delivery
            Err(e) => error!(sink = %self.name, error = %e, "UDP send failed"),
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.socket = None;
        debug!(sink = %self.name, "Stream outlet closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn receiver() -> (UdpSocket, StreamBusConfig) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = StreamBusConfig {
            target: socket.local_addr().unwrap().to_string(),
            ..Default::default()
        };
        (socket, config)
    }

    async fn recv_message(socket: &UdpSocket, format: StreamFormat) -> BusMessage {
        let mut buf = vec![0u8; 2048];
        let len = tokio::time::timeout(Duration::from_secs(2), socket.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        BusMessage::decode(&buf[..len], format).unwrap()
    }

    #[tokio::test]
    async fn test_announces_outlet_then_pushes_samples() {
        let (socket, config) = receiver().await;
        let mut sink = StreamBusSink::new(&config).await.unwrap();

        match recv_message(&socket, StreamFormat::Json).await {
            BusMessage::Announce(info) => {
                assert_eq!(info.name, "egisync");
                assert_eq!(info.stream_type, "trigger");
                assert_eq!(info.channel_count, 1);
                assert_eq!(info.nominal_srate, IRREGULAR_RATE);
                assert_eq!(info.channel_format, "string");
            }
            other => panic!("expected announcement, got {:?}", other),
        }

        let event = TriggerEvent::now(b'A' as i8);
        sink.trigger(event).await.unwrap();

        match recv_message(&socket, StreamFormat::Json).await {
            BusMessage::Sample {
                stream,
                timestamp,
                values,
            } => {
                assert_eq!(stream, "egisync");
                assert_eq!(values, vec!["A".to_string()]);
                assert!((timestamp - monotonic_seconds(event.timestamp)).abs() < 1e-9);
            }
            other => panic!("expected sample, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bincode_format() {
        let (socket, mut config) = receiver().await;
        config.format = StreamFormat::Bincode;
        let mut sink = StreamBusSink::new(&config).await.unwrap();
        assert!(matches!(
            recv_message(&socket, StreamFormat::Bincode).await,
            BusMessage::Announce(_)
        ));

        sink.trigger(TriggerEvent::now(5)).await.unwrap();
        assert!(matches!(
            recv_message(&socket, StreamFormat::Bincode).await,
            BusMessage::Sample { .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_target_fails_construction() {
        let config = StreamBusConfig {
            target: "not an address".to_string(),
            ..Default::default()
        };
        assert!(StreamBusSink::new(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_trigger_after_close_fails() {
        let (_socket, config) = receiver().await;
        let mut sink = StreamBusSink::new(&config).await.unwrap();
        sink.close().await.unwrap();
        assert!(sink.trigger(TriggerEvent::now(1)).await.is_err());
    }
}
