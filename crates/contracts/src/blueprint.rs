//! ServiceBlueprint - Config Loader 输出
//!
//! 描述完整的服务配置：解码预设与覆盖项、传输层、输出路由、统计周期。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{DecoderConfig, DecoderPreset};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的服务配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 解码器设置
    #[serde(default)]
    pub decoder: DecoderOverrides,

    /// 传输层设置
    #[serde(default)]
    pub transport: TransportConfig,

    /// 输出路由配置
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,

    /// 统计输出设置
    #[serde(default)]
    pub stats: StatsConfig,
}

/// Preset plus optional per-field overrides for the decoder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderOverrides {
    /// Base preset the overrides apply to
    #[serde(default)]
    pub preset: DecoderPreset,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_bytes: Option<[u8; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_sentinel: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_mask: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_reserved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_overrun_ceiling: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_length_ceiling: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_length_prefix: Option<bool>,
}

impl DecoderOverrides {
    /// Apply the overrides on top of the preset's base config.
    pub fn resolve(&self) -> DecoderConfig {
        let base = self.preset.config();
        DecoderConfig {
            packet_size: self.packet_size.unwrap_or(base.packet_size),
            frame_size: self.frame_size.unwrap_or(base.frame_size),
            header_bytes: self.header_bytes.unwrap_or(base.header_bytes),
            reserved_sentinel: self.reserved_sentinel.unwrap_or(base.reserved_sentinel),
            sequence_mask: self.sequence_mask.unwrap_or(base.sequence_mask),
            strict_reserved: self.strict_reserved.unwrap_or(base.strict_reserved),
            buffer_overrun_ceiling: self
                .buffer_overrun_ceiling
                .unwrap_or(base.buffer_overrun_ceiling),
            batch_length_ceiling: self
                .batch_length_ceiling
                .unwrap_or(base.batch_length_ceiling),
            use_length_prefix: self.use_length_prefix.unwrap_or(base.use_length_prefix),
        }
    }
}

/// 传输层配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// 监听地址 (serve 模式)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// 单次读取的最大字节数
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// 会话事件通道容量
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// 通道满时的处理策略
    #[serde(default)]
    pub drop_policy: DropPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            read_buffer_size: default_read_buffer_size(),
            channel_capacity: default_channel_capacity(),
            drop_policy: DropPolicy::default(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:3334".to_string()
}

fn default_read_buffer_size() -> usize {
    4096
}

fn default_channel_capacity() -> usize {
    1024
}

/// 丢包策略 (背压满时)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// 丢弃最新的事件并计数
    #[default]
    DropNewest,
    /// 等待通道空位 (向 TCP 读端施加背压)
    Block,
}

/// Sink 输出配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 十六进制转储文件
    HexFile,
    /// 每行一个 JSON 事件
    Jsonl,
}

/// 统计输出配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsConfig {
    /// 周期报告间隔 (秒)，0 表示只在退出时输出
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
        }
    }
}

fn default_report_interval() -> u64 {
    5
}

impl ServiceBlueprint {
    /// Build the effective DecoderConfig from preset and overrides
    pub fn to_decoder_config(&self) -> DecoderConfig {
        self.decoder.resolve()
    }
}
