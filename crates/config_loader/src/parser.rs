//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use std::path::Path;

use contracts::{ContractError, ServiceBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// 从文件路径推断格式
    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse(format!(
                "cannot determine config format of '{}'",
                path.display()
            ))
        })?;
        Self::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<ServiceBlueprint, ContractError> {
    toml::from_str(content)
        .map_err(|e| ContractError::config_parse_with(format!("TOML parse error: {e}"), e))
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<ServiceBlueprint, ContractError> {
    serde_json::from_str(content)
        .map_err(|e| ContractError::config_parse_with(format!("JSON parse error: {e}"), e))
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<ServiceBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DecoderPreset, DropPolicy, SinkType};

    #[test]
    fn test_parse_toml_full() {
        let content = r#"
version = "V1"

[decoder]
preset = "extended"
strict_reserved = true
header_bytes = [10, 0]

[transport]
listen_addr = "127.0.0.1:3334"
read_buffer_size = 2816
drop_policy = "block"

[[sinks]]
name = "hexdump"
sink_type = "hex_file"
params = { path = "dump.hex" }

[stats]
report_interval_secs = 10
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.decoder.preset, DecoderPreset::Extended);
        assert_eq!(bp.decoder.strict_reserved, Some(true));
        assert_eq!(bp.decoder.header_bytes, Some([0x0A, 0x00]));
        assert_eq!(bp.transport.read_buffer_size, 2816);
        assert_eq!(bp.transport.channel_capacity, 1024);
        assert_eq!(bp.transport.drop_policy, DropPolicy::Block);
        assert_eq!(bp.sinks[0].sink_type, SinkType::HexFile);
        assert_eq!(bp.sinks[0].params.get("path").map(String::as_str), Some("dump.hex"));
        assert_eq!(bp.stats.report_interval_secs, 10);
    }

    #[test]
    fn test_parse_toml_empty_uses_defaults() {
        let bp = parse_toml("").unwrap();
        assert_eq!(bp.decoder.preset, DecoderPreset::Compact);
        assert_eq!(bp.transport.listen_addr, "0.0.0.0:3334");
        assert!(bp.sinks.is_empty());
        assert_eq!(bp.stats.report_interval_secs, 5);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "decoder": { "preset": "compact_prefixed", "batch_length_ceiling": 2816 },
            "sinks": [{ "name": "events", "sink_type": "jsonl", "params": { "path": "events.jsonl" } }]
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.decoder.preset, DecoderPreset::CompactPrefixed);
        assert_eq!(bp.sinks[0].sink_type, SinkType::Jsonl);
    }

    #[test]
    fn test_parse_unknown_preset() {
        let result = parse_toml("[decoder]\npreset = \"giant\"\n");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
