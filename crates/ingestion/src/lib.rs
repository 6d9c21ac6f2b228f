//! # Ingestion
//!
//! 传输层：把字节流接入 `StreamDecoder`。
//!
//! Responsibilities:
//! - TCP listener / client sessions (one decoder per connection)
//! - Capture file replay
//! - Mock device for tests and `--mock`
//! - Backpressure into one shared `async-channel` of `SessionEvent`s
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{BackpressureConfig, TcpIngest};
//!
//! let (tx, rx) = async_channel::bounded(1024);
//! let ingest = TcpIngest::new(blueprint.to_decoder_config(), BackpressureConfig::default(), tx)
//!     .with_shutdown(shutdown_rx);
//! tokio::spawn(async move { ingest.serve("0.0.0.0:3334").await });
//!
//! while let Ok(event) = rx.recv().await {
//!     // Dispatch event
//! }
//! ```

mod config;
mod error;
mod mock;
mod publish;
mod replay;
mod session;
mod tcp;

// Re-exports
pub use config::{BackpressureConfig, DropPolicy, IngestionMetrics, MetricsSnapshot};
pub use contracts::SessionEvent;
pub use error::{IngestionError, Result};
pub use mock::{MockDevice, MockDeviceConfig};
pub use publish::publish_event;
pub use replay::ReplaySource;
pub use session::{SessionDriver, SessionSummary};
pub use tcp::TcpIngest;
