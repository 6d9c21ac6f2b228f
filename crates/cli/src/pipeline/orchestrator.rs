//! Pipeline orchestrator - wires a byte source, the stats subscriber and the dispatcher.
//!
//! ```text
//! source sessions ──async-channel──▶ stats loop ──mpsc──▶ Dispatcher ──▶ sinks
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_channel::Sender;
use contracts::{DecoderConfig, ServiceBlueprint, SessionEvent};
use ingestion::{
    BackpressureConfig, IngestionError, IngestionMetrics, MetricsSnapshot, MockDevice,
    MockDeviceConfig, ReplaySource, TcpIngest,
};
use observability::EventStatsAggregator;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::PipelineStats;

/// How long sessions and sinks get to finish after a stop
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the bytes come from
#[derive(Debug, Clone)]
pub enum Source {
    /// Accept device connections; optionally attach a mock device over loopback
    Listen {
        addr: String,
        mock: Option<MockDeviceConfig>,
    },
    /// Connect to a device or relay
    Connect { addr: String },
    /// Decode a capture file
    Replay { path: PathBuf, chunk_size: usize },
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub blueprint: ServiceBlueprint,

    pub source: Source,

    /// Stop after this many complete frames (None = unlimited)
    pub max_frames: Option<u64>,

    /// Run timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Dispatcher input queue capacity
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the source is exhausted, a limit is reached or `shutdown` resolves.
    ///
    /// Stopping never cuts sessions off: they are told to end, publish their
    /// `SessionEnded`, and the dispatcher drains before this returns.
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;
        let decoder = blueprint.to_decoder_config();
        let backpressure = BackpressureConfig::from(&blueprint.transport);

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        info!(
            packet_size = decoder.packet_size,
            frame_size = decoder.frame_size,
            length_prefix = decoder.use_length_prefix,
            strict_reserved = decoder.strict_reserved,
            sinks = blueprint.sinks.len(),
            "Starting pipeline"
        );

        // Dispatcher
        let (dispatch_tx, dispatch_rx) = mpsc::channel(self.config.buffer_size.max(1));
        let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), dispatch_rx)
            .context("Failed to create sinks")?;
        let sink_metrics = dispatcher.metrics();
        let dispatcher_handle = dispatcher.spawn();

        // Source
        let (event_tx, event_rx) = async_channel::bounded(backpressure.channel_capacity.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let metrics = Arc::new(IngestionMetrics::new());
        let source_task = self
            .spawn_source(decoder, backpressure, event_tx, stop_rx, metrics.clone())
            .await?;

        // a mock run ends with its only session
        let stop_after_sessions = match &self.config.source {
            Source::Listen { mock: Some(_), .. } => Some(1),
            _ => None,
        };

        // Stats loop
        let mut aggregator = EventStatsAggregator::new();
        let mut absorbed = MetricsSnapshot::default();
        let report_every = Duration::from_secs(blueprint.stats.report_interval_secs.max(1));
        let mut report_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + report_every,
            report_every,
        );

        let timeout = self.config.timeout;
        let timeout_fut = async move {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending().await,
            }
        };
        let drain = tokio::time::sleep(Duration::from_secs(u32::MAX as u64));
        tokio::pin!(shutdown, timeout_fut, drain);
        let mut stopping = false;

        loop {
            tokio::select! {
                received = event_rx.recv() => {
                    // every session ended and the source released its sender
                    let Ok(event) = received else { break };
                    aggregator.update(&event.event);

                    if dispatch_tx.send(event).await.is_err() {
                        warn!("Dispatcher channel closed");
                        break;
                    }

                    if !stopping {
                        if let Some(reason) = self.limit_reached(&aggregator, stop_after_sessions) {
                            info!(reason, frames = aggregator.frames_complete, "Stopping sessions");
                            stopping = true;
                            let _ = stop_tx.send(true);
                            drain.as_mut().reset(tokio::time::Instant::now() + DRAIN_TIMEOUT);
                        }
                    }
                }
                _ = report_tick.tick() => {
                    absorb_transport(&mut aggregator, &metrics, &mut absorbed);
                    report_progress(&aggregator);
                }
                _ = &mut shutdown, if !stopping => {
                    warn!("Received shutdown signal, stopping sessions...");
                    stopping = true;
                    let _ = stop_tx.send(true);
                    drain.as_mut().reset(tokio::time::Instant::now() + DRAIN_TIMEOUT);
                }
                _ = &mut timeout_fut, if !stopping => {
                    warn!(timeout_secs = timeout.map(|t| t.as_secs()), "Pipeline timed out");
                    stopping = true;
                    let _ = stop_tx.send(true);
                    drain.as_mut().reset(tokio::time::Instant::now() + DRAIN_TIMEOUT);
                }
                _ = &mut drain, if stopping => {
                    warn!("Sessions did not finish in time, abandoning them");
                    break;
                }
            }
        }

        // Shutdown
        info!("Shutting down pipeline...");
        let _ = stop_tx.send(true);
        drop(dispatch_tx);

        let source_result = match tokio::time::timeout(DRAIN_TIMEOUT, source_task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(error = %e, "Source task panicked");
                Ok(())
            }
            Err(_) => {
                warn!("Source task did not stop in time");
                Ok(())
            }
        };

        if tokio::time::timeout(DRAIN_TIMEOUT, dispatcher_handle).await.is_err() {
            warn!("Dispatcher did not drain in time");
        }

        source_result.context("Ingestion failed")?;

        absorb_transport(&mut aggregator, &metrics, &mut absorbed);
        let sinks = sink_metrics
            .iter()
            .map(|(name, m)| (name.clone(), m.snapshot()))
            .collect();
        let stats = PipelineStats::new(&aggregator, metrics.snapshot(), sinks, start_time.elapsed());

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            frames = stats.frames_complete(),
            "Pipeline shutdown complete"
        );
        Ok(stats)
    }

    fn limit_reached(
        &self,
        aggregator: &EventStatsAggregator,
        stop_after_sessions: Option<u64>,
    ) -> Option<&'static str> {
        if self
            .config
            .max_frames
            .is_some_and(|max| aggregator.frames_complete >= max)
        {
            return Some("max frames reached");
        }
        if stop_after_sessions.is_some_and(|n| aggregator.sessions_ended >= n) {
            return Some("mock device finished");
        }
        None
    }

    async fn spawn_source(
        &self,
        decoder: DecoderConfig,
        backpressure: BackpressureConfig,
        tx: Sender<SessionEvent>,
        stop: watch::Receiver<bool>,
        metrics: Arc<IngestionMetrics>,
    ) -> Result<JoinHandle<Result<(), IngestionError>>> {
        let handle = match self.config.source.clone() {
            Source::Listen { addr, mock } => {
                let listener = TcpIngest::bind(&addr)
                    .await
                    .with_context(|| format!("Failed to listen on {addr}"))?;
                let local_addr = listener.local_addr()?;

                if let Some(device) = mock {
                    spawn_mock_device(local_addr, device);
                }

                let ingest = TcpIngest::new(decoder, backpressure, tx)
                    .with_metrics(metrics)
                    .with_shutdown(stop);
                tokio::spawn(async move { ingest.serve_on(listener).await })
            }
            Source::Connect { addr } => {
                let ingest = TcpIngest::new(decoder, backpressure, tx)
                    .with_metrics(metrics)
                    .with_shutdown(stop);
                tokio::spawn(async move { ingest.connect(&addr).await.map(|_| ()) })
            }
            Source::Replay { path, chunk_size } => tokio::spawn(async move {
                ReplaySource::new(path, chunk_size)
                    .with_shutdown(stop)
                    .run(decoder, &backpressure, tx, metrics)
                    .await
                    .map(|_| ())
            }),
        };
        Ok(handle)
    }
}

/// Connect a mock device to our own listener
fn spawn_mock_device(addr: std::net::SocketAddr, config: MockDeviceConfig) {
    info!(frames = config.frames, %addr, "Running with MOCK device");
    let device = MockDevice::new(config);
    tokio::spawn(async move {
        let result = match TcpStream::connect(addr).await {
            Ok(stream) => device.stream_to(stream).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(bytes) => debug!(bytes, "Mock device done"),
            Err(e) => warn!(error = %e, "Mock device failed"),
        }
    });
}

/// Fold transport counters gathered since the last call into the aggregator
fn absorb_transport(
    aggregator: &mut EventStatsAggregator,
    metrics: &IngestionMetrics,
    absorbed: &mut MetricsSnapshot,
) {
    let now = metrics.snapshot();
    let delta = now.delta_since(absorbed);
    aggregator.record_bytes(delta.bytes_received as usize);
    aggregator.record_loss(delta.estimated_lost);
    *absorbed = now;
}

fn report_progress(aggregator: &EventStatsAggregator) {
    let report = aggregator.summary();
    info!(
        elapsed_secs = format!("{:.1}", report.elapsed.as_secs_f64()),
        frames_complete = report.frames_complete,
        frames_incomplete = report.frames_incomplete,
        sequence_errors = report.sequence_errors,
        packets_valid = report.packets_valid,
        packets_invalid = report.packets_invalid,
        packet_error_rate = format!("{:.2}%", report.packet_error_rate),
        frame_error_rate = format!("{:.2}%", report.frame_error_rate),
        fps = format!("{:.2}", report.frames_per_sec),
        throughput_kbps = format!("{:.2}", report.throughput_bps / 1024.0),
        estimated_lost = report.estimated_lost,
        "Statistics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SinkConfig, SinkType};
    use std::collections::HashMap;
    use std::io::Write;

    fn config(source: Source, blueprint: ServiceBlueprint) -> PipelineConfig {
        PipelineConfig {
            blueprint,
            source,
            max_frames: None,
            timeout: Some(Duration::from_secs(10)),
            buffer_size: 64,
            metrics_port: None,
        }
    }

    #[tokio::test]
    async fn test_replay_pipeline_writes_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let jsonl = dir.path().join("events.jsonl");
        let capture = dir.path().join("capture.bin");
        let device = MockDevice::new(MockDeviceConfig {
            frames: 4,
            missing_sequence_every: Some(2),
            ..Default::default()
        });
        std::fs::File::create(&capture)
            .unwrap()
            .write_all(&device.generate())
            .unwrap();

        let blueprint = ServiceBlueprint {
            sinks: vec![SinkConfig {
                name: "events".into(),
                sink_type: SinkType::Jsonl,
                queue_capacity: 256,
                params: HashMap::from([("path".into(), jsonl.display().to_string())]),
            }],
            ..Default::default()
        };

        let stats = Pipeline::new(config(
            Source::Replay {
                path: capture,
                chunk_size: 50,
            },
            blueprint,
        ))
        .run(std::future::pending())
        .await
        .unwrap();

        assert_eq!(stats.report.frames_complete, 2);
        assert_eq!(stats.report.sequence_errors, 2);
        assert_eq!(stats.report.estimated_lost, 2);
        assert_eq!(stats.report.sessions_ended, 1);
        assert_eq!(stats.sinks[0].1.written, stats.ingestion.events_published);

        let lines = std::fs::read_to_string(&jsonl).unwrap();
        assert_eq!(
            lines.lines().count() as u64,
            stats.ingestion.events_published
        );
    }

    #[tokio::test]
    async fn test_mock_listen_pipeline_stops_after_device() {
        let stats = Pipeline::new(config(
            Source::Listen {
                addr: "127.0.0.1:0".into(),
                mock: Some(MockDeviceConfig {
                    frames: 5,
                    ..Default::default()
                }),
            },
            ServiceBlueprint::default(),
        ))
        .run(std::future::pending())
        .await
        .unwrap();

        assert_eq!(stats.report.frames_complete, 5);
        assert_eq!(stats.ingestion.sessions_started, 1);
        assert_eq!(stats.report.bytes_received, 5 * 352);
    }

    #[tokio::test]
    async fn test_max_frames_limit() {
        let mut cfg = config(
            Source::Listen {
                addr: "127.0.0.1:0".into(),
                mock: Some(MockDeviceConfig {
                    frames: 50,
                    frame_interval: Duration::from_millis(5),
                    ..Default::default()
                }),
            },
            ServiceBlueprint::default(),
        );
        cfg.max_frames = Some(3);

        let stats = Pipeline::new(cfg).run(std::future::pending()).await.unwrap();
        assert!(stats.report.frames_complete >= 3);
        assert!(stats.report.frames_complete < 50);
        assert_eq!(stats.report.sessions_ended, 1);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_listener() {
        let stats = Pipeline::new(config(
            Source::Listen {
                addr: "127.0.0.1:0".into(),
                mock: None,
            },
            ServiceBlueprint::default(),
        ))
        .run(tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap();

        assert_eq!(stats.report.frames_complete, 0);
        assert_eq!(stats.ingestion.sessions_started, 0);
    }

    #[tokio::test]
    async fn test_missing_capture_is_error() {
        let result = Pipeline::new(config(
            Source::Replay {
                path: "/nonexistent/capture.bin".into(),
                chunk_size: 64,
            },
            ServiceBlueprint::default(),
        ))
        .run(std::future::pending())
        .await;
        assert!(result.is_err());
    }
}
