//! SinkHandle - one sink behind its own bounded queue and worker task

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{EventSink, SessionEvent};

use crate::metrics::SinkMetrics;

/// Handle to a running sink worker.
///
/// A slow or failing sink only ever fills its own queue; the dispatcher
/// drops and counts events for it instead of waiting.
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<Arc<SessionEvent>>,
    metrics: Arc<SinkMetrics>,
    worker: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the worker task for `sink`
    pub fn spawn<S: EventSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker = tokio::spawn(sink_worker(sink, rx, Arc::clone(&metrics), name.clone()));

        Self {
            name,
            tx,
            metrics,
            worker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue an event without waiting.
    ///
    /// Returns false if the queue was full (event dropped) or the worker is gone.
    pub fn try_send(&self, event: Arc<SessionEvent>) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.metrics.record_dropped();
                observability::record_event_dispatched(&self.name, false);
                warn!(
                    sink = %self.name,
                    session = %event.session_id,
                    kind = event.event.kind(),
                    "sink queue full, event dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Queue an event, waiting for room. Used for `SessionEnded`, which a sink
    /// must always see to release per-session state.
    ///
    /// Returns false only if the worker is gone.
    pub async fn send(&self, event: Arc<SessionEvent>) -> bool {
        match self.tx.send(event).await {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(_) => {
                error!(sink = %self.name, "sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Close the queue and wait for the worker to drain, flush and close the sink.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(sink = %self.name, error = ?e, "sink worker panicked");
        }
        debug!(sink = %self.name, "sink handle shut down");
    }
}

#[instrument(name = "sink_worker", skip(sink, rx, metrics), fields(sink = %name))]
async fn sink_worker<S: EventSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Arc<SessionEvent>>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!("sink worker started");

    while let Some(event) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&event).await {
            Ok(()) => {
                metrics.record_written();
                observability::record_event_dispatched(&name, true);
            }
            Err(e) => {
                // a failed write never stops the worker
                metrics.record_failed();
                observability::record_event_dispatched(&name, false);
                error!(
                    session = %event.session_id,
                    kind = event.event.kind(),
                    error = %e,
                    "sink write failed"
                );
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(error = %e, "flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(error = %e, "close failed on shutdown");
    }

    debug!("sink worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, SessionId, StreamEvent};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    struct MockSink {
        name: String,
        write_count: Arc<AtomicU64>,
        should_fail: bool,
        delay_ms: u64,
    }

    impl EventSink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, _event: &SessionEvent) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.should_fail {
                return Err(ContractError::sink_write(&self.name, "mock failure"));
            }
            self.write_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn event(dropped_bytes: usize) -> Arc<SessionEvent> {
        Arc::new(SessionEvent::new(
            SessionId::new("test"),
            StreamEvent::BufferOverrunDiscarded { dropped_bytes },
        ))
    }

    #[tokio::test]
    async fn test_sink_handle_basic() {
        let write_count = Arc::new(AtomicU64::new(0));
        let handle = SinkHandle::spawn(
            MockSink {
                name: "test".to_string(),
                write_count: Arc::clone(&write_count),
                should_fail: false,
                delay_ms: 0,
            },
            10,
        );

        for i in 0..5 {
            assert!(handle.try_send(event(i)));
        }

        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.written(), 5);
    }

    #[tokio::test]
    async fn test_sink_handle_queue_full() {
        let handle = SinkHandle::spawn(
            MockSink {
                name: "slow".to_string(),
                write_count: Arc::new(AtomicU64::new(0)),
                should_fail: false,
                delay_ms: 100,
            },
            2,
        );

        for i in 0..10 {
            handle.try_send(event(i));
        }

        assert!(handle.metrics().dropped() > 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sink_handle_send_waits_for_room() {
        let write_count = Arc::new(AtomicU64::new(0));
        let handle = SinkHandle::spawn(
            MockSink {
                name: "slow".to_string(),
                write_count: Arc::clone(&write_count),
                should_fail: false,
                delay_ms: 20,
            },
            1,
        );

        for i in 0..4 {
            assert!(handle.send(event(i)).await);
        }

        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.dropped(), 0);
    }

    #[tokio::test]
    async fn test_sink_handle_failure_isolation() {
        let handle = SinkHandle::spawn(
            MockSink {
                name: "failing".to_string(),
                write_count: Arc::new(AtomicU64::new(0)),
                should_fail: true,
                delay_ms: 0,
            },
            10,
        );

        for i in 0..3 {
            handle.try_send(event(i));
        }

        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;
        assert_eq!(metrics.failed(), 3);
    }
}
