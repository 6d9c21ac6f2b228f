//! Backpressure configuration and metrics

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::TransportConfig;
pub use contracts::DropPolicy;

/// Backpressure configuration
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    /// Capacity of the shared session-event channel
    pub channel_capacity: usize,

    /// Policy when the channel is full
    pub drop_policy: DropPolicy,

    /// Size of each socket/file read
    pub read_buffer_size: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

impl From<&TransportConfig> for BackpressureConfig {
    fn from(transport: &TransportConfig) -> Self {
        Self {
            channel_capacity: transport.channel_capacity,
            drop_policy: transport.drop_policy,
            read_buffer_size: transport.read_buffer_size,
        }
    }
}

impl BackpressureConfig {
    pub fn new(channel_capacity: usize, drop_policy: DropPolicy) -> Self {
        Self {
            channel_capacity,
            drop_policy,
            ..Default::default()
        }
    }

    /// Override the read chunk size
    pub fn with_read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size.max(1);
        self
    }
}

/// Ingestion metrics, shared by every session of one transport
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    pub bytes_received: AtomicU64,
    pub chunks_read: AtomicU64,
    pub events_published: AtomicU64,
    /// Events lost to a full channel under `DropNewest`
    pub events_dropped: AtomicU64,
    pub estimated_lost: AtomicU64,
    pub sessions_started: AtomicU64,
    pub sessions_finished: AtomicU64,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_chunk(&self, len: usize) {
        self.chunks_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_loss(&self, lost: u64) {
        self.estimated_lost.fetch_add(lost, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_finished(&self) {
        self.sessions_finished.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            chunks_read: self.chunks_read.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            estimated_lost: self.estimated_lost.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_finished: self.sessions_finished.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bytes_received: u64,
    pub chunks_read: u64,
    pub events_published: u64,
    pub events_dropped: u64,
    pub estimated_lost: u64,
    pub sessions_started: u64,
    pub sessions_finished: u64,
}

impl MetricsSnapshot {
    /// Sessions still running at snapshot time
    pub fn sessions_active(&self) -> u64 {
        self.sessions_started.saturating_sub(self.sessions_finished)
    }

    /// Counter growth since an earlier snapshot
    pub fn delta_since(&self, earlier: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_received: self.bytes_received.saturating_sub(earlier.bytes_received),
            chunks_read: self.chunks_read.saturating_sub(earlier.chunks_read),
            events_published: self.events_published.saturating_sub(earlier.events_published),
            events_dropped: self.events_dropped.saturating_sub(earlier.events_dropped),
            estimated_lost: self.estimated_lost.saturating_sub(earlier.estimated_lost),
            sessions_started: self.sessions_started.saturating_sub(earlier.sessions_started),
            sessions_finished: self.sessions_finished.saturating_sub(earlier.sessions_finished),
        }
    }
}
