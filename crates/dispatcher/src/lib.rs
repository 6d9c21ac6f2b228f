//! # Dispatcher
//!
//! 事件分发模块。
//!
//! 负责：
//! - 消费 `SessionEvent`
//! - Fan-out 到多个 sinks (log / hex_file / jsonl)
//! - 隔离慢 sink，不阻塞主链路

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{EventSink, SessionEvent};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{SinkMetrics, SinkMetricsSnapshot};
pub use sinks::{FileSinkConfig, HexFileSink, JsonlSink, LogSink};
