//! BridgeConfig - Config Loader output
//!
//! Every section carries defaults, so an empty document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Send trigger 1, wait a second, send trigger 2 once all sinks are up
    #[serde(default = "default_true")]
    pub startup_test_triggers: bool,

    /// Amplifier connection and clock sync
    #[serde(default)]
    pub amplifier: AmplifierConfig,

    /// Inbound TCP trigger listener
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Queue-fed ingestion path
    #[serde(default)]
    pub queue: QueueConfig,

    /// Streaming-bus outlet
    #[serde(default)]
    pub stream_bus: StreamBusConfig,

    /// Diagnostic text sink
    #[serde(default)]
    pub diagnostic: DiagnosticConfig,

    /// Fan-out behavior
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            startup_test_triggers: true,
            amplifier: AmplifierConfig::default(),
            listener: ListenerConfig::default(),
            queue: QueueConfig::default(),
            stream_bus: StreamBusConfig::default(),
            diagnostic: DiagnosticConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Amplifier connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmplifierConfig {
    /// Amplifier host name or address
    #[serde(default = "default_amplifier_host")]
    pub host: String,

    /// Amplifier TCP port
    #[serde(default = "default_amplifier_port")]
    pub port: u16,

    /// Upper bound on clock-sync rounds
    #[serde(default = "default_sync_max_rounds")]
    pub sync_max_rounds: u32,

    /// Round-trip below which a sync round is accepted (milliseconds)
    #[serde(default = "default_sync_threshold_ms")]
    pub sync_threshold_ms: u64,

    /// Event duration sent with every trigger (milliseconds)
    #[serde(default = "default_trigger_duration_ms")]
    pub trigger_duration_ms: i32,
}

impl AmplifierConfig {
    /// `host:port` string used for connecting and error reporting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Sync acceptance threshold as a [`Duration`]
    pub fn sync_threshold(&self) -> Duration {
        Duration::from_millis(self.sync_threshold_ms)
    }
}

impl Default for AmplifierConfig {
    fn default() -> Self {
        Self {
            host: default_amplifier_host(),
            port: default_amplifier_port(),
            sync_max_rounds: default_sync_max_rounds(),
            sync_threshold_ms: default_sync_threshold_ms(),
            trigger_duration_ms: default_trigger_duration_ms(),
        }
    }
}

fn default_amplifier_host() -> String {
    "127.0.0.1".to_string()
}

fn default_amplifier_port() -> u16 {
    55513
}

fn default_sync_max_rounds() -> u32 {
    100
}

fn default_sync_threshold_ms() -> u64 {
    2
}

fn default_trigger_duration_ms() -> i32 {
    100
}

/// Inbound trigger listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Address to bind
    #[serde(default = "default_listener_bind")]
    pub bind_addr: String,

    /// Listening port
    #[serde(default = "default_listener_port")]
    pub port: u16,
}

impl ListenerConfig {
    /// `bind_addr:port` string
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_listener_bind(),
            port: default_listener_port(),
        }
    }
}

fn default_listener_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_listener_port() -> u16 {
    2000
}

/// Trigger queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Bounded wait of a single pop (milliseconds)
    #[serde(default = "default_pop_timeout_ms")]
    pub pop_timeout_ms: u64,
}

impl QueueConfig {
    /// Pop wait as a [`Duration`]
    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            pop_timeout_ms: default_pop_timeout_ms(),
        }
    }
}

fn default_pop_timeout_ms() -> u64 {
    500
}

/// Serialization format for streaming-bus datagrams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFormat {
    /// JSON (human-readable, larger)
    #[default]
    Json,
    /// Bincode (binary, compact)
    Bincode,
}

/// Streaming-bus outlet settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamBusConfig {
    /// Whether the outlet is created at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Outlet name
    #[serde(default = "default_stream_name")]
    pub name: String,

    /// Outlet type tag
    #[serde(default = "default_stream_type")]
    pub stream_type: String,

    /// Datagram target (`host:port`)
    #[serde(default = "default_stream_target")]
    pub target: String,

    /// Datagram encoding
    #[serde(default)]
    pub format: StreamFormat,
}

impl Default for StreamBusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: default_stream_name(),
            stream_type: default_stream_type(),
            target: default_stream_target(),
            format: StreamFormat::default(),
        }
    }
}

fn default_stream_name() -> String {
    "egisync".to_string()
}

fn default_stream_type() -> String {
    "trigger".to_string()
}

fn default_stream_target() -> String {
    "127.0.0.1:16571".to_string()
}

/// Diagnostic sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticConfig {
    /// Print one line per trigger on stdout
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// What a fan-out does when one sink fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Deliver to every sink, report all failures together
    #[default]
    Isolate,
    /// Stop at the first failing sink
    FailFast,
}

/// Dispatcher settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Failure policy
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: BridgeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.amplifier.host, "127.0.0.1");
        assert_eq!(config.amplifier.port, 55513);
        assert_eq!(config.amplifier.sync_max_rounds, 100);
        assert_eq!(config.amplifier.sync_threshold(), Duration::from_millis(2));
        assert_eq!(config.amplifier.trigger_duration_ms, 100);
        assert_eq!(config.listener.port, 2000);
        assert_eq!(config.queue.pop_timeout(), Duration::from_millis(500));
        assert_eq!(config.stream_bus.name, "egisync");
        assert_eq!(config.stream_bus.stream_type, "trigger");
        assert!(config.diagnostic.enabled);
        assert!(config.startup_test_triggers);
        assert_eq!(config.dispatch.failure_policy, FailurePolicy::Isolate);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{ "amplifier": { "host": "10.0.0.42" } }"#).unwrap();
        assert_eq!(config.amplifier.address(), "10.0.0.42:55513");
    }

    #[test]
    fn test_failure_policy_snake_case() {
        let config: DispatchConfig =
            serde_json::from_str(r#"{ "failure_policy": "fail_fast" }"#).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
    }
}
