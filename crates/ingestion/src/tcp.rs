//! TCP transport: listener (device connects to us) and client (we connect to a relay).

use std::sync::Arc;
use std::time::Duration;

use async_channel::Sender;
use contracts::{DecoderConfig, SessionEvent, SessionId};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::config::{BackpressureConfig, IngestionMetrics};
use crate::error::{IngestionError, Result};
use crate::session::{shutdown_requested, SessionDriver, SessionSummary};

/// Pause after a failed `accept` (e.g. fd exhaustion) before retrying
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// TCP ingestion front end.
///
/// Each accepted connection gets its own `SessionDriver` on its own task;
/// sessions share nothing but the event channel and the metrics.
pub struct TcpIngest {
    decoder: DecoderConfig,
    backpressure: BackpressureConfig,
    tx: Sender<SessionEvent>,
    metrics: Arc<IngestionMetrics>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl TcpIngest {
    pub fn new(
        decoder: DecoderConfig,
        backpressure: BackpressureConfig,
        tx: Sender<SessionEvent>,
    ) -> Self {
        Self {
            decoder,
            backpressure,
            tx,
            metrics: Arc::new(IngestionMetrics::new()),
            shutdown: None,
        }
    }

    /// Share an existing metrics instance
    pub fn with_metrics(mut self, metrics: Arc<IngestionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Stop accepting and end open sessions once `shutdown` turns `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Bind a listener
    pub async fn bind(listen_addr: &str) -> Result<TcpListener> {
        TcpListener::bind(listen_addr)
            .await
            .map_err(|source| IngestionError::Bind {
                addr: listen_addr.to_string(),
                source,
            })
    }

    /// Bind `listen_addr` and serve until shutdown.
    pub async fn serve(&self, listen_addr: &str) -> Result<()> {
        let listener = Self::bind(listen_addr).await?;
        self.serve_on(listener).await
    }

    /// Accept connections on `listener` until shutdown, then wait for
    /// every open session to publish its `SessionEnded`.
    #[instrument(name = "tcp_serve", skip_all)]
    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "listening for device connections");

        let mut shutdown = self.shutdown.clone();
        let mut sessions = JoinSet::new();
        let mut ordinal = 0u64;

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(err) => {
                            accept_backoff(&err).await;
                            continue;
                        }
                    };
                    ordinal += 1;
                    let session_id = SessionId::for_peer(peer, ordinal);
                    info!(session = %session_id, peer = %peer, "device connected");

                    let driver = self.driver(session_id)?;
                    sessions.spawn(driver.run(stream));
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_session_result(joined);
                }
                _ = shutdown_requested(&mut shutdown) => {
                    info!(open_sessions = sessions.len(), "shutdown requested, no longer accepting");
                    break;
                }
            }
        }

        while let Some(joined) = sessions.join_next().await {
            log_session_result(joined);
        }
        info!("listener stopped");
        Ok(())
    }

    /// Connect to `addr` and run a single session until the peer closes.
    #[instrument(name = "tcp_connect", skip(self))]
    pub async fn connect(&self, addr: &str) -> Result<SessionSummary> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| IngestionError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        let peer = stream.peer_addr()?;
        let session_id = SessionId::for_peer(peer, 1);
        info!(session = %session_id, "connected to device");

        self.driver(session_id)?.run(stream).await
    }

    fn driver(&self, session_id: SessionId) -> Result<SessionDriver> {
        let driver = SessionDriver::new(
            session_id,
            self.decoder.clone(),
            &self.backpressure,
            self.tx.clone(),
            self.metrics.clone(),
        )?;
        Ok(match &self.shutdown {
            Some(shutdown) => driver.with_shutdown(shutdown.clone()),
            None => driver,
        })
    }
}

async fn accept_backoff(err: &std::io::Error) {
    warn!(error = %err, retry_in = ?ACCEPT_RETRY_DELAY, "accept failed");
    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
}

fn log_session_result(joined: std::result::Result<Result<SessionSummary>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(summary)) => debug!(
            session = %summary.session_id,
            bytes = summary.bytes_received,
            events = summary.events_emitted,
            "session task finished"
        ),
        Ok(Err(err)) => warn!(error = %err, "session task failed"),
        Err(err) => warn!(error = %err, "session task panicked or was cancelled"),
    }
}
