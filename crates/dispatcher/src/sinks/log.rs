//! LogSink - one structured tracing line per event

use contracts::{ContractError, EventSink, SessionEvent, StreamEvent};
use tracing::{debug, info, instrument, warn};

/// Sink that logs every event; anomalies at warn, the rest at info
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_event(&self, event: &SessionEvent) {
        let session = &event.session_id;
        match &event.event {
            StreamEvent::FrameComplete { frame } => info!(
                sink = %self.name,
                session = %session,
                index = frame.index,
                packets = frame.len(),
                bytes = frame.byte_len(),
                "frame complete"
            ),
            StreamEvent::SessionEnded { unconsumed_bytes } => info!(
                sink = %self.name,
                session = %session,
                unconsumed_bytes,
                "session ended"
            ),
            other => warn!(
                sink = %self.name,
                session = %session,
                kind = other.kind(),
                "{other}"
            ),
        }
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, kind = event.event.kind())
    )]
    async fn write(&mut self, event: &SessionEvent) -> Result<(), ContractError> {
        self.log_event(event);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
