//! # Observability
//!
//! 可观测性模块：Tracing 初始化 + Prometheus 指标 + 事件统计。
//!
//! ## 功能
//!
//! - Tracing 订阅器 (JSON/Pretty/Compact，`RUST_LOG` 优先)
//! - Prometheus 指标导出 (`--metrics-port`)
//! - StreamEvent 计数与 [`EventStatsAggregator`] 周期摘要
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{LogFormat, ObservabilityConfig};
//!
//! let config = ObservabilityConfig {
//!     log_format: LogFormat::Compact,
//!     ..Default::default()
//! };
//! observability::init_tracing(&config.with_verbosity(1, false))?;
//! observability::init_metrics_only(9100)?;
//!
//! for event in decoder.on_bytes(&chunk) {
//!     observability::record_event(&event);
//! }
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_bytes_received, record_estimated_loss, record_event, record_event_dispatched,
    record_session_closed, record_session_opened, EventStatsAggregator, RunningStats,
    StatsReport, StatsSummary,
};

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// 未设置 `RUST_LOG` 时的过滤指令
    pub default_filter: String,
    /// 强制使用 `default_filter`，忽略 `RUST_LOG` (`--quiet`)
    pub ignore_env: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            default_filter: "info".to_string(),
            ignore_env: false,
        }
    }
}

impl ObservabilityConfig {
    /// Filter level for `-v` repetitions, `warn` when quiet
    pub fn with_verbosity(mut self, verbose: u8, quiet: bool) -> Self {
        self.ignore_env = quiet;
        self.default_filter = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
        .to_string();
        self
    }

    fn filter(&self) -> EnvFilter {
        if self.ignore_env {
            return EnvFilter::new(&self.default_filter);
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    Json,
    /// 人类可读格式
    #[default]
    Pretty,
    /// 紧凑单行格式
    Compact,
}

/// 仅安装全局 tracing 订阅器
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_target(false).boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// 管道启动时按 `--metrics-port` 调用；Tracing 在进程入口已完成初始化。
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to install Prometheus recorder on port {port}"))?;

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.default_filter, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_verbosity_levels() {
        let base = ObservabilityConfig::default;
        assert_eq!(base().with_verbosity(1, false).default_filter, "debug");
        assert_eq!(base().with_verbosity(3, false).default_filter, "trace");

        let quiet = base().with_verbosity(2, true);
        assert_eq!(quiet.default_filter, "warn");
        assert!(quiet.ignore_env);
    }
}
