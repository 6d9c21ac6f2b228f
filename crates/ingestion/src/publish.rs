//! Publishing session events into the shared channel, honouring the drop policy

use async_channel::{Sender, TrySendError};
use contracts::{DropPolicy, SessionEvent, StreamEvent};
use tracing::{trace, warn};

use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};

/// Publish one event.
///
/// `DropNewest` never waits: a full channel drops the event and counts it.
/// `Block` waits for capacity, which stalls the session's reads.
/// `SessionEnded` is always awaited so every session is seen to end.
/// Either way a closed channel is an error, the session cannot deliver anything.
pub async fn publish_event(
    tx: &Sender<SessionEvent>,
    event: SessionEvent,
    metrics: &IngestionMetrics,
    drop_policy: DropPolicy,
) -> Result<()> {
    let policy = match event.event {
        StreamEvent::SessionEnded { .. } => DropPolicy::Block,
        _ => drop_policy,
    };
    match policy {
        DropPolicy::DropNewest => match tx.try_send(event) {
            Ok(()) => {
                metrics.record_published();
                Ok(())
            }
            Err(TrySendError::Full(event)) => {
                metrics.record_dropped();
                metrics::counter!("lidar_framer_events_dropped_total", "kind" => event.event.kind())
                    .increment(1);
                trace!(session = %event.session_id, kind = event.event.kind(), "event dropped (newest)");
                Ok(())
            }
            Err(TrySendError::Closed(event)) => {
                warn!(session = %event.session_id, "event channel closed");
                Err(IngestionError::ChannelClosed {
                    session_id: event.session_id,
                })
            }
        },
        DropPolicy::Block => match tx.send(event).await {
            Ok(()) => {
                metrics.record_published();
                Ok(())
            }
            Err(err) => {
                let event = err.into_inner();
                warn!(session = %event.session_id, "event channel closed");
                Err(IngestionError::ChannelClosed {
                    session_id: event.session_id,
                })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_channel::bounded;
    use contracts::SessionId;

    fn invalid_batch(session: &str) -> SessionEvent {
        SessionEvent::new(
            SessionId::new(session),
            StreamEvent::InvalidBatchLength { declared: 0 },
        )
    }

    fn ended(session: &str) -> SessionEvent {
        SessionEvent::new(
            SessionId::new(session),
            StreamEvent::SessionEnded {
                unconsumed_bytes: 0,
            },
        )
    }

    #[tokio::test]
    async fn test_drop_newest_when_full() {
        let (tx, rx) = bounded(1);
        let metrics = IngestionMetrics::new();

        publish_event(&tx, invalid_batch("a"), &metrics, DropPolicy::DropNewest)
            .await
            .unwrap();
        publish_event(&tx, invalid_batch("b"), &metrics, DropPolicy::DropNewest)
            .await
            .unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_published, 1);
        assert_eq!(snapshot.events_dropped, 1);
        // the queued event is the first one
        assert_eq!(rx.recv().await.unwrap().session_id, "a");
    }

    #[tokio::test]
    async fn test_session_ended_never_dropped() {
        let (tx, rx) = bounded(1);
        let metrics = std::sync::Arc::new(IngestionMetrics::new());

        publish_event(&tx, invalid_batch("a"), &metrics, DropPolicy::DropNewest)
            .await
            .unwrap();

        let pending = {
            let tx = tx.clone();
            let metrics = metrics.clone();
            tokio::spawn(async move {
                publish_event(&tx, ended("a"), &metrics, DropPolicy::DropNewest).await
            })
        };

        assert_eq!(rx.recv().await.unwrap().event.kind(), "invalid_batch_length");
        pending.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().event.kind(), "session_ended");
        assert_eq!(metrics.snapshot().events_dropped, 0);
    }

    #[tokio::test]
    async fn test_block_waits_for_capacity() {
        let (tx, rx) = bounded(1);
        let metrics = std::sync::Arc::new(IngestionMetrics::new());

        publish_event(&tx, ended("a"), &metrics, DropPolicy::Block)
            .await
            .unwrap();

        let blocked = {
            let tx = tx.clone();
            let metrics = metrics.clone();
            tokio::spawn(async move { publish_event(&tx, ended("b"), &metrics, DropPolicy::Block).await })
        };

        assert_eq!(rx.recv().await.unwrap().session_id, "a");
        blocked.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().session_id, "b");
        assert_eq!(metrics.snapshot().events_dropped, 0);
    }

    #[tokio::test]
    async fn test_closed_channel_is_error() {
        let (tx, rx) = bounded(4);
        drop(rx);
        let metrics = IngestionMetrics::new();
        for policy in [DropPolicy::DropNewest, DropPolicy::Block] {
            let err = publish_event(&tx, ended("x"), &metrics, policy)
                .await
                .unwrap_err();
            assert!(matches!(err, IngestionError::ChannelClosed { .. }));
        }
    }
}
