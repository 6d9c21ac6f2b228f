//! Dispatcher - fans session events out to sinks

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{SessionEvent, SinkConfig, SinkType, StreamEvent};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::SinkMetricsSnapshot;
use crate::sinks::{HexFileSink, JsonlSink, LogSink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<SessionEvent>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<SessionEvent>) -> Self {
        Self { config, input_rx }
    }

    /// Open every sink and start its worker
    #[instrument(name = "dispatcher_build", skip(self), fields(sink_count = self.config.sinks.len()))]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let handles = self
            .config
            .sinks
            .iter()
            .map(create_sink_handle)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    let creation_error = |e| DispatcherError::sink_creation(&config.name, e);
    let handle = match config.sink_type {
        SinkType::Log => SinkHandle::spawn(LogSink::new(&config.name), config.queue_capacity),
        SinkType::HexFile => SinkHandle::spawn(
            HexFileSink::from_params(&config.name, &config.params).map_err(creation_error)?,
            config.queue_capacity,
        ),
        SinkType::Jsonl => SinkHandle::spawn(
            JsonlSink::from_params(&config.name, &config.params).map_err(creation_error)?,
            config.queue_capacity,
        ),
    };
    debug!("sink ready");
    Ok(handle)
}

/// Consumes the session-event stream and offers every event to every sink
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<SessionEvent>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>, input_rx: mpsc::Receiver<SessionEvent>) -> Self {
        Self { handles, input_rx }
    }

    pub fn sink_count(&self) -> usize {
        self.handles.len()
    }

    /// Live metrics of every sink, shareable after `spawn`
    pub fn metrics(&self) -> Vec<(String, Arc<crate::metrics::SinkMetrics>)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), Arc::clone(h.metrics())))
            .collect()
    }

    /// Current snapshot of every sink's metrics
    pub fn snapshot(&self) -> Vec<(String, SinkMetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run until the input channel closes, then drain and close every sink.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut event_count: u64 = 0;
        while let Some(event) = self.input_rx.recv().await {
            event_count += 1;
            self.dispatch(event).await;

            if event_count.is_multiple_of(1000) {
                debug!(events = event_count, "Dispatcher progress");
            }
        }

        info!(events = event_count, "Dispatcher input closed, draining sinks");
        for handle in self.handles {
            handle.shutdown().await;
        }
        info!("Dispatcher shutdown complete");
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Fan out to every sink. Full queues drop the event, except the terminal
    /// `SessionEnded`, which waits for room.
    async fn dispatch(&self, event: SessionEvent) {
        let terminal = matches!(event.event, StreamEvent::SessionEnded { .. });
        let event = Arc::new(event);
        for handle in &self.handles {
            if terminal {
                handle.send(Arc::clone(&event)).await;
            } else {
                handle.try_send(Arc::clone(&event));
            }
        }
    }
}

/// Convenience function to create a dispatcher from sink configs
pub fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<SessionEvent>,
) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new(
        DispatcherConfig {
            sinks: sink_configs,
        },
        input_rx,
    )
    .build()
}
