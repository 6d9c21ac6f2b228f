//! Decoder configuration contracts shared across crates.
//!
//! The engine is parameterized by [`DecoderConfig`]; framing variants differ
//! only in configuration, never in code path.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

use crate::ContractError;

/// Default packet signature (`0A 00`).
pub const DEFAULT_HEADER: [u8; 2] = [0x0A, 0x00];

/// Decoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_cross_fields"))]
#[serde(default)]
pub struct DecoderConfig {
    /// Bytes per packet, including header, sequence and reserved byte
    #[validate(range(min = 4, message = "packet_size must be at least 4"))]
    pub packet_size: usize,

    /// Packets per frame
    #[validate(range(min = 1, max = 256, message = "frame_size must be within 1..=256"))]
    pub frame_size: usize,

    /// Packet signature
    pub header_bytes: [u8; 2],

    /// Expected value of `block[3]`
    pub reserved_sentinel: u8,

    /// Mask applied to `block[2]` to extract the sequence number
    pub sequence_mask: u8,

    /// Reject packets whose reserved byte differs from the sentinel
    pub strict_reserved: bool,

    /// Noise bytes tolerated since the last accepted block before the pending
    /// buffer is discarded
    pub buffer_overrun_ceiling: usize,

    /// Maximum accepted length prefix (length-prefixed transport only)
    #[validate(range(min = 1, message = "batch_length_ceiling must be positive"))]
    pub batch_length_ceiling: u32,

    /// Transport is a sequence of `[u32 BE length][blob]` records
    pub use_length_prefix: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            packet_size: 44,
            frame_size: 8,
            header_bytes: DEFAULT_HEADER,
            reserved_sentinel: 0x00,
            sequence_mask: 0x0F,
            strict_reserved: false,
            buffer_overrun_ceiling: 65536,
            batch_length_ceiling: 65536,
            use_length_prefix: false,
        }
    }
}

impl DecoderConfig {
    /// Bytes in one complete frame.
    pub fn frame_bytes(&self) -> usize {
        self.packet_size * self.frame_size
    }

    /// Run derive rules and cross-field checks, mapping the first failure to
    /// a [`ContractError::ConfigValidation`].
    pub fn check(&self) -> Result<(), ContractError> {
        self.validate().map_err(|errors| {
            let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            if let Some((field, errs)) = fields.into_iter().next() {
                if let Some(first) = errs.first() {
                    // schema-level errors are keyed as "__all__"; name them by code
                    let field = if field == "__all__" {
                        first.code.to_string()
                    } else {
                        field.to_string()
                    };
                    return ContractError::config_validation(
                        format!("decoder.{field}"),
                        describe(first),
                    );
                }
            }
            ContractError::config_validation("decoder", errors.to_string())
        })
    }
}

fn describe(error: &ValidationError) -> String {
    error
        .message
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| error.code.to_string())
}

fn validate_cross_fields(config: &DecoderConfig) -> Result<(), ValidationError> {
    if config.frame_size >= 1 && config.frame_size <= 256 {
        let top = (config.frame_size - 1) as u8;
        if top & config.sequence_mask != top {
            return Err(ValidationError::new("sequence_mask").with_message(Cow::Owned(
                format!(
                    "sequence_mask 0x{:02X} cannot express sequence {}",
                    config.sequence_mask, top
                ),
            )));
        }
    }
    if config.buffer_overrun_ceiling < config.packet_size {
        return Err(
            ValidationError::new("buffer_overrun_ceiling").with_message(Cow::Borrowed(
                "buffer_overrun_ceiling must be at least packet_size",
            )),
        );
    }
    Ok(())
}

/// 预设解码配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderPreset {
    /// 44 字节包，连续字节流
    #[default]
    Compact,
    /// 352 字节包，连续字节流 (batched firmware)
    Extended,
    /// 44 字节包，长度前缀记录
    CompactPrefixed,
}

impl DecoderPreset {
    pub const ALL: [DecoderPreset; 3] = [Self::Compact, Self::Extended, Self::CompactPrefixed];

    /// Base configuration for this preset.
    pub fn config(self) -> DecoderConfig {
        match self {
            Self::Compact => DecoderConfig::default(),
            Self::Extended => DecoderConfig {
                packet_size: 352,
                ..DecoderConfig::default()
            },
            Self::CompactPrefixed => DecoderConfig {
                use_length_prefix: true,
                ..DecoderConfig::default()
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Extended => "extended",
            Self::CompactPrefixed => "compact_prefixed",
        }
    }
}

impl std::str::FromStr for DecoderPreset {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str() == s)
            .ok_or_else(|| {
                ContractError::config_validation("decoder.preset", format!("unknown preset '{s}'"))
            })
    }
}

impl std::fmt::Display for DecoderPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DecoderConfig::default();
        assert!(config.check().is_ok());
        assert_eq!(config.frame_bytes(), 352);
    }

    #[test]
    fn test_presets() {
        assert_eq!(DecoderPreset::Extended.config().packet_size, 352);
        assert!(DecoderPreset::CompactPrefixed.config().use_length_prefix);
        assert!(!DecoderPreset::Compact.config().use_length_prefix);
        for preset in DecoderPreset::ALL {
            assert!(preset.config().check().is_ok());
            assert_eq!(preset.as_str().parse::<DecoderPreset>().unwrap(), preset);
        }
        assert!("huge".parse::<DecoderPreset>().is_err());
    }

    #[test]
    fn test_packet_size_too_small() {
        let config = DecoderConfig {
            packet_size: 3,
            buffer_overrun_ceiling: 64,
            ..Default::default()
        };
        let err = config.check().unwrap_err();
        assert!(err.to_string().contains("packet_size"));
    }

    #[test]
    fn test_mask_must_cover_frame_size() {
        let config = DecoderConfig {
            frame_size: 8,
            sequence_mask: 0x03,
            ..Default::default()
        };
        let err = config.check().unwrap_err();
        assert!(err.to_string().contains("sequence_mask"));
    }

    #[test]
    fn test_ceiling_below_packet_size() {
        let config = DecoderConfig {
            packet_size: 352,
            buffer_overrun_ceiling: 100,
            ..Default::default()
        };
        assert!(config.check().is_err());
    }

    #[test]
    fn test_serde_partial_fields_fall_back_to_defaults() {
        let config: DecoderConfig =
            serde_json::from_str(r#"{"packet_size": 352, "header_bytes": [10, 0]}"#).unwrap();
        assert_eq!(config.packet_size, 352);
        assert_eq!(config.frame_size, 8);
        assert_eq!(config.sequence_mask, 0x0F);
    }
}
