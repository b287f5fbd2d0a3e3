//! 配置校验模块
//!
//! 校验规则：
//! - 端口非 0
//! - sync_max_rounds > 0, sync_threshold_ms > 0
//! - trigger_duration_ms >= 0, pop_timeout_ms > 0
//! - 启用 stream bus 时 name / target 非空
//! - 放大器在本机时监听端口不能与放大器端口相同

use contracts::{BridgeConfig, ContractError};

/// 校验 BridgeConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &BridgeConfig) -> Result<(), ContractError> {
    validate_amplifier(config)?;
    validate_listener(config)?;
    validate_queue(config)?;
    validate_stream_bus(config)?;
    Ok(())
}

/// 校验放大器配置
fn validate_amplifier(config: &BridgeConfig) -> Result<(), ContractError> {
    let amp = &config.amplifier;

    if amp.host.trim().is_empty() {
        return Err(ContractError::config_validation(
            "amplifier.host",
            "host cannot be empty",
        ));
    }
    if amp.port == 0 {
        return Err(ContractError::config_validation(
            "amplifier.port",
            "port must be non-zero",
        ));
    }
    if amp.sync_max_rounds == 0 {
        return Err(ContractError::config_validation(
            "amplifier.sync_max_rounds",
            "sync_max_rounds must be > 0",
        ));
    }
    if amp.sync_threshold_ms == 0 {
        return Err(ContractError::config_validation(
            "amplifier.sync_threshold_ms",
            "sync_threshold_ms must be > 0",
        ));
    }
    if amp.trigger_duration_ms < 0 {
        return Err(ContractError::config_validation(
            "amplifier.trigger_duration_ms",
            format!(
                "trigger_duration_ms must be >= 0, got {}",
                amp.trigger_duration_ms
            ),
        ));
    }
    Ok(())
}

/// 校验监听配置
fn validate_listener(config: &BridgeConfig) -> Result<(), ContractError> {
    let listener = &config.listener;

    if listener.port == 0 {
        return Err(ContractError::config_validation(
            "listener.port",
            "port must be non-zero",
        ));
    }
    if is_local_host(&config.amplifier.host) && listener.port == config.amplifier.port {
        return Err(ContractError::config_validation(
            "listener.port",
            format!(
                "listener port {} collides with the local amplifier port",
                listener.port
            ),
        ));
    }
    Ok(())
}

/// 校验队列配置
fn validate_queue(config: &BridgeConfig) -> Result<(), ContractError> {
    if config.queue.pop_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "queue.pop_timeout_ms",
            "pop_timeout_ms must be > 0",
        ));
    }
    Ok(())
}

/// 校验 stream bus 配置 (仅在启用时)
fn validate_stream_bus(config: &BridgeConfig) -> Result<(), ContractError> {
    let bus = &config.stream_bus;
    if !bus.enabled {
        return Ok(());
    }

    if bus.name.trim().is_empty() {
        return Err(ContractError::config_validation(
            "stream_bus.name",
            "outlet name cannot be empty",
        ));
    }
    if bus.target.trim().is_empty() {
        return Err(ContractError::config_validation(
            "stream_bus.target",
            "target cannot be empty",
        ));
    }
    Ok(())
}

fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1" | "0.0.0.0")
}
