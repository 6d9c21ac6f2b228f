//! 配置校验模块
//!
//! 校验规则：
//! - 解码参数合法 (派生规则 + 跨字段检查，见 `DecoderConfig::check`)
//! - listen_addr 可解析
//! - read_buffer_size / channel_capacity > 0
//! - sink 名称非空且唯一，文件类 sink 必须提供 path

use std::collections::HashSet;
use std::net::SocketAddr;

use contracts::{ContractError, ServiceBlueprint, SinkType};

/// 校验 ServiceBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    validate_decoder(blueprint)?;
    validate_transport(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 校验合并后的解码配置
fn validate_decoder(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    blueprint.to_decoder_config().check()
}

/// 校验传输层配置
fn validate_transport(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    let transport = &blueprint.transport;

    if transport.listen_addr.parse::<SocketAddr>().is_err() {
        return Err(ContractError::config_validation(
            "transport.listen_addr",
            format!("'{}' is not a valid socket address", transport.listen_addr),
        ));
    }
    if transport.read_buffer_size == 0 {
        return Err(ContractError::config_validation(
            "transport.read_buffer_size",
            "read_buffer_size must be > 0",
        ));
    }
    if transport.channel_capacity == 0 {
        return Err(ContractError::config_validation(
            "transport.channel_capacity",
            "channel_capacity must be > 0",
        ));
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
        let needs_path = matches!(sink.sink_type, SinkType::HexFile | SinkType::Jsonl);
        if needs_path && !sink.params.get("path").is_some_and(|p| !p.is_empty()) {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.path", sink.name),
                "file sinks require a 'path' parameter",
            ));
        }
    }
    Ok(())
}
