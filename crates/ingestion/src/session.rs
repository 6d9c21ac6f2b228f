//! Session driver: one byte stream, one decoder, one terminal `SessionEnded`.

use std::sync::Arc;

use async_channel::Sender;
use contracts::{DecoderConfig, DropPolicy, SessionEvent, SessionId, StreamEvent};
use frame_engine::{LossStats, StreamDecoder};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::config::{BackpressureConfig, IngestionMetrics};
use crate::error::Result;
use crate::publish::publish_event;

/// Outcome of one finished session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub bytes_received: u64,
    pub events_emitted: u64,
    pub unconsumed_bytes: usize,
    pub loss: LossStats,
    /// Read error that ended the session, if any
    pub read_error: Option<String>,
}

/// Why the read loop stopped
enum Stop {
    Eof,
    Shutdown,
    ReadError(std::io::Error),
}

/// Publishes one session's events, tagging each with the session id
struct EventPublisher {
    session_id: SessionId,
    tx: Sender<SessionEvent>,
    metrics: Arc<IngestionMetrics>,
    drop_policy: DropPolicy,
    events_emitted: u64,
}

impl EventPublisher {
    async fn publish_all(&mut self, events: Vec<StreamEvent>) -> Result<()> {
        for event in events {
            observability::record_event(&event);
            if event.is_anomaly() {
                warn!(session = %self.session_id, kind = event.kind(), "{event}");
            } else {
                debug!(session = %self.session_id, kind = event.kind(), "{event}");
            }
            self.events_emitted += 1;
            publish_event(
                &self.tx,
                SessionEvent::new(self.session_id.clone(), event),
                &self.metrics,
                self.drop_policy,
            )
            .await?;
        }
        Ok(())
    }
}

/// Drives a `StreamDecoder` from an `AsyncRead` source.
///
/// Every chunk is decoded in arrival order and the resulting events are
/// published as `SessionEvent`s. The session always finishes with
/// `SessionEnded`, whether the source hit EOF, failed, or a shutdown was
/// signalled.
pub struct SessionDriver {
    decoder: StreamDecoder,
    publisher: EventPublisher,
    read_buffer_size: usize,
    shutdown: Option<watch::Receiver<bool>>,
    reported_loss: u64,
}

impl SessionDriver {
    pub fn new(
        session_id: SessionId,
        decoder: DecoderConfig,
        backpressure: &BackpressureConfig,
        tx: Sender<SessionEvent>,
        metrics: Arc<IngestionMetrics>,
    ) -> Result<Self> {
        Ok(Self {
            decoder: StreamDecoder::new(decoder)?,
            publisher: EventPublisher {
                session_id,
                tx,
                metrics,
                drop_policy: backpressure.drop_policy,
                events_emitted: 0,
            },
            read_buffer_size: backpressure.read_buffer_size.max(1),
            shutdown: None,
            reported_loss: 0,
        })
    }

    /// End the session early once `shutdown` turns `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.publisher.session_id
    }

    /// Read `source` to the end and publish every decoded event.
    ///
    /// Fails only when the event channel is closed; read errors end the
    /// session normally and are reported in the summary.
    #[instrument(name = "session", skip_all, fields(session = %self.publisher.session_id))]
    pub async fn run<R>(mut self, mut source: R) -> Result<SessionSummary>
    where
        R: AsyncRead + Unpin,
    {
        let metrics = self.publisher.metrics.clone();
        info!("session started");
        metrics.record_session_started();
        observability::record_session_opened();

        let result = self.read_loop(&mut source).await;
        let result = match result {
            Ok(stop) => self.finish(stop).await,
            Err(err) => Err(err),
        };

        observability::record_session_closed();
        metrics.record_session_finished();
        if let Err(err) = &result {
            warn!(error = %err, "session aborted");
        }
        result
    }

    async fn read_loop<R>(&mut self, source: &mut R) -> Result<Stop>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; self.read_buffer_size];
        let mut shutdown = self.shutdown.clone();

        loop {
            let read = tokio::select! {
                read = source.read(&mut buf) => read,
                _ = shutdown_requested(&mut shutdown) => return Ok(Stop::Shutdown),
            };

            let n = match read {
                Ok(0) => return Ok(Stop::Eof),
                Ok(n) => n,
                Err(err) => return Ok(Stop::ReadError(err)),
            };

            self.publisher.metrics.record_chunk(n);
            observability::record_bytes_received(n);

            let events = self.decoder.on_bytes(&buf[..n]);
            self.report_loss();
            self.publisher.publish_all(events).await?;
        }
    }

    async fn finish(mut self, stop: Stop) -> Result<SessionSummary> {
        let read_error = match stop {
            Stop::Eof => None,
            Stop::Shutdown => {
                info!("session stopped by shutdown");
                None
            }
            Stop::ReadError(err) => {
                warn!(error = %err, "read failed, ending session");
                Some(err.to_string())
            }
        };

        self.report_loss();
        let loss = self.decoder.loss_stats();
        let bytes_received = self.decoder.bytes_fed();

        let Self {
            decoder,
            mut publisher,
            ..
        } = self;
        let events = decoder.on_end_of_stream();
        let unconsumed_bytes = events
            .iter()
            .find_map(|event| match event {
                StreamEvent::SessionEnded { unconsumed_bytes } => Some(*unconsumed_bytes),
                _ => None,
            })
            .unwrap_or(0);
        publisher.publish_all(events).await?;

        info!(
            bytes = bytes_received,
            events = publisher.events_emitted,
            unconsumed_bytes,
            estimated_lost = loss.estimated_lost,
            "session ended"
        );

        Ok(SessionSummary {
            session_id: publisher.session_id,
            bytes_received,
            events_emitted: publisher.events_emitted,
            unconsumed_bytes,
            loss,
            read_error,
        })
    }

    /// Forward growth of the loss estimate to the metrics
    fn report_loss(&mut self) {
        let lost = self.decoder.loss_stats().estimated_lost;
        let delta = lost.saturating_sub(self.reported_loss);
        if delta > 0 {
            self.publisher.metrics.record_loss(delta);
            observability::record_estimated_loss(delta);
            self.reported_loss = lost;
        }
    }
}

/// Resolves once shutdown is signalled; never resolves without a receiver
/// or after the sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        if rx.wait_for(|stop| *stop).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockDeviceConfig};
    use contracts::{DecoderPreset, StreamEvent};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    fn driver(tx: Sender<SessionEvent>, metrics: Arc<IngestionMetrics>) -> SessionDriver {
        SessionDriver::new(
            SessionId::new("test"),
            DecoderPreset::Compact.config(),
            &BackpressureConfig::new(64, DropPolicy::Block).with_read_buffer_size(13),
            tx,
            metrics,
        )
        .unwrap()
    }

    fn drain(rx: &async_channel::Receiver<SessionEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event.event);
        }
        events
    }

    /// Yields `data` then fails
    struct FailingReader {
        data: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let remaining = self.data.len() - self.pos;
            if remaining == 0 {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "reset by peer",
                )));
            }
            let n = remaining.min(buf.remaining());
            let start = self.pos;
            buf.put_slice(&self.data[start..start + n]);
            self.pos += n;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_session_decodes_mock_stream() {
        let device = MockDevice::new(MockDeviceConfig {
            frames: 6,
            missing_sequence_every: Some(3),
            ..Default::default()
        });
        let stream = device.generate();
        let (tx, rx) = async_channel::unbounded();
        let metrics = Arc::new(IngestionMetrics::new());

        let summary = driver(tx, metrics.clone())
            .run(stream.as_slice())
            .await
            .unwrap();
        let events = drain(&rx);

        let complete = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::FrameComplete { .. }))
            .count();
        assert_eq!(complete, device.intact_frames());
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::SequenceError { .. })));
        assert!(matches!(
            events.last(),
            Some(StreamEvent::SessionEnded { .. })
        ));

        assert_eq!(summary.bytes_received, stream.len() as u64);
        assert_eq!(summary.events_emitted, events.len() as u64);
        assert_eq!(summary.loss.estimated_lost, 2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bytes_received, stream.len() as u64);
        assert_eq!(snapshot.estimated_lost, 2);
        assert_eq!(snapshot.sessions_active(), 0);
    }

    #[tokio::test]
    async fn test_read_error_still_ends_session() {
        let device = MockDevice::new(MockDeviceConfig::default());
        let mut data = device.packet(0);
        data.extend_from_slice(&device.packet(1));

        let (tx, rx) = async_channel::unbounded();
        let summary = driver(tx, Arc::new(IngestionMetrics::new()))
            .run(FailingReader { data, pos: 0 })
            .await
            .unwrap();

        assert!(summary.read_error.is_some());
        let events = drain(&rx);
        assert!(matches!(
            events.as_slice(),
            [
                StreamEvent::FrameIncomplete { partial_frame },
                StreamEvent::SessionEnded { unconsumed_bytes: 0 },
            ] if partial_frame.len() == 2
        ));
    }

    #[tokio::test]
    async fn test_shutdown_ends_idle_session() {
        let (tx, rx) = async_channel::unbounded();
        let (stop_tx, stop_rx) = watch::channel(false);
        // keep the writer half open so reads stay pending
        let (_device, host) = tokio::io::duplex(64);

        let task = tokio::spawn(
            driver(tx, Arc::new(IngestionMetrics::new()))
                .with_shutdown(stop_rx)
                .run(host),
        );
        stop_tx.send(true).unwrap();

        let summary = task.await.unwrap().unwrap();
        assert!(summary.read_error.is_none());
        assert_eq!(
            drain(&rx),
            vec![StreamEvent::SessionEnded {
                unconsumed_bytes: 0
            }]
        );
    }

    #[tokio::test]
    async fn test_full_channel_still_delivers_session_ended() {
        let stream = MockDevice::new(MockDeviceConfig {
            frames: 3,
            ..Default::default()
        })
        .generate();
        let (tx, rx) = async_channel::bounded(1);
        let metrics = Arc::new(IngestionMetrics::new());
        let driver = SessionDriver::new(
            SessionId::new("full"),
            DecoderPreset::Compact.config(),
            &BackpressureConfig::new(1, DropPolicy::DropNewest),
            tx,
            metrics.clone(),
        )
        .unwrap();

        let task = tokio::spawn(async move { driver.run(stream.as_slice()).await });

        let mut received = Vec::new();
        while let Ok(event) = rx.recv().await {
            received.push(event.event.kind());
        }
        let summary = task.await.unwrap().unwrap();

        assert_eq!(received.last(), Some(&"session_ended"));
        assert_eq!(summary.events_emitted, 4);
        assert_eq!(
            metrics.snapshot().events_dropped,
            summary.events_emitted - received.len() as u64
        );
    }

    #[tokio::test]
    async fn test_closed_channel_aborts_session() {
        let (tx, rx) = async_channel::bounded(1);
        drop(rx);
        let stream = MockDevice::new(MockDeviceConfig::default()).generate();

        let err = driver(tx, Arc::new(IngestionMetrics::new()))
            .run(stream.as_slice())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::IngestionError::ChannelClosed { .. }));
    }
}
