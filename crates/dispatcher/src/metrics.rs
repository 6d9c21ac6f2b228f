//! Per-sink delivery counters

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for one sink worker
#[derive(Debug, Default)]
pub struct SinkMetrics {
    queue_len: AtomicUsize,
    written: AtomicU64,
    failed: AtomicU64,
    /// Events never queued because the sink's queue was full
    dropped: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn record_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SinkMetricsSnapshot {
        SinkMetricsSnapshot {
            queue_len: self.queue_len.load(Ordering::Relaxed),
            written: self.written(),
            failed: self.failed(),
            dropped: self.dropped(),
        }
    }
}

/// Point-in-time copy of [`SinkMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkMetricsSnapshot {
    pub queue_len: usize,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl SinkMetricsSnapshot {
    /// Share of offered events that reached the sink, in percent
    pub fn delivery_rate(&self) -> f64 {
        let offered = self.written + self.failed + self.dropped;
        if offered == 0 {
            return 100.0;
        }
        self.written as f64 / offered as f64 * 100.0
    }
}

impl fmt::Display for SinkMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "written={} failed={} dropped={} queued={} ({:.1}% delivered)",
            self.written,
            self.failed,
            self.dropped,
            self.queue_len,
            self.delivery_rate()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_rate() {
        let metrics = SinkMetrics::new();
        assert_eq!(metrics.snapshot().delivery_rate(), 100.0);

        for _ in 0..3 {
            metrics.record_written();
        }
        metrics.record_dropped();
        let snapshot = metrics.snapshot();
        assert!((snapshot.delivery_rate() - 75.0).abs() < 1e-9);
        assert!(snapshot.to_string().contains("dropped=1"));
    }
}
