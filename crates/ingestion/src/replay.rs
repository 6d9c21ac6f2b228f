//! Capture replay: decode a recorded byte stream as one session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_channel::Sender;
use contracts::{DecoderConfig, SessionEvent, SessionId};
use tokio::fs::File;
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::config::{BackpressureConfig, IngestionMetrics};
use crate::error::{IngestionError, Result};
use crate::session::{SessionDriver, SessionSummary};

/// Replays a binary capture file through a decoder, `chunk_size` bytes at a time.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    path: PathBuf,
    chunk_size: usize,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            path: path.into(),
            chunk_size: chunk_size.max(1),
            shutdown: None,
        }
    }

    /// Stop replaying once `shutdown` turns `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Session id derived from the capture's file name
    pub fn session_id(&self) -> SessionId {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        SessionId::from(format!("replay:{name}"))
    }

    #[instrument(name = "replay", skip_all, fields(path = %self.path.display()))]
    pub async fn run(
        &self,
        decoder: DecoderConfig,
        backpressure: &BackpressureConfig,
        tx: Sender<SessionEvent>,
        metrics: Arc<IngestionMetrics>,
    ) -> Result<SessionSummary> {
        let file = File::open(&self.path)
            .await
            .map_err(|source| IngestionError::OpenCapture {
                path: self.path.display().to_string(),
                source,
            })?;
        info!(chunk_size = self.chunk_size, "replaying capture");

        let backpressure = backpressure.clone().with_read_buffer_size(self.chunk_size);
        let mut driver = SessionDriver::new(self.session_id(), decoder, &backpressure, tx, metrics)?;
        if let Some(shutdown) = &self.shutdown {
            driver = driver.with_shutdown(shutdown.clone());
        }
        driver.run(file).await
    }
}
