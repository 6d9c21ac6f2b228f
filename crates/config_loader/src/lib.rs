//! # Config Loader
//!
//! 加载并校验 `ServiceBlueprint`。
//!
//! - TOML 为主，按扩展名也接受 JSON
//! - 解析后立即校验 (解码参数 / 传输层 / sink 路由)
//! - 未给出配置文件时使用内置默认值
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("framer.toml")).unwrap();
//! let decoder = blueprint.to_decoder_config();
//! println!("{} x {} bytes", decoder.frame_size, decoder.packet_size);
//! ```

mod parser;
mod validator;

pub use contracts::ServiceBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;
use tracing::debug;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate a configuration file; the format follows the extension.
    pub fn load_from_path(path: &Path) -> Result<ServiceBlueprint, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let blueprint = Self::load_from_str(&content, format)?;
        debug!(path = %path.display(), ?format, sinks = blueprint.sinks.len(), "configuration loaded");
        Ok(blueprint)
    }

    /// Parse and validate configuration text.
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ServiceBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Load `path` when given, otherwise the built-in defaults (also validated).
    pub fn load_or_default(path: Option<&Path>) -> Result<ServiceBlueprint, ContractError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let blueprint = ServiceBlueprint::default();
                validator::validate(&blueprint)?;
                Ok(blueprint)
            }
        }
    }

    /// Validate a blueprint assembled or modified in code (e.g. after CLI overrides)
    pub fn validate(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    pub fn to_toml(blueprint: &ServiceBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse_with(format!("TOML serialize error: {e}"), e))
    }

    pub fn to_json(blueprint: &ServiceBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse_with(format!("JSON serialize error: {e}"), e))
    }
}
