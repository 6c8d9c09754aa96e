//! Relay Service
//!
//! Consumes upstream feed events in arrival order, keeps `FeedState`
//! current, and publishes the matching envelope (if any) through the
//! `EnvelopeSink` port.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::application::ports::EnvelopeSink;
use crate::domain::envelope::{RelayEnvelope, STATUS_DISCONNECTED, STATUS_SUBSCRIBED};
use crate::domain::feed::{ConnectionState, FeedEvent, FeedState};
use crate::infrastructure::metrics;

/// Bridges upstream feed events to viewers.
pub struct RelayService<S> {
    sink: Arc<S>,
    feed_state: Arc<FeedState>,
}

impl<S: EnvelopeSink> RelayService<S> {
    /// Create a new relay service.
    #[must_use]
    pub const fn new(sink: Arc<S>, feed_state: Arc<FeedState>) -> Self {
        Self { sink, feed_state }
    }

    /// Process events until the upstream client drops its sender.
    pub async fn run(self, mut rx: mpsc::Receiver<FeedEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event);
        }
        tracing::debug!("Feed event channel closed");
    }

    /// Apply one event and publish its envelope.
    pub fn handle(&self, event: FeedEvent) {
        let Some(envelope) = self.apply(event) else {
            return;
        };
        let delivered = self.sink.publish(&envelope);
        tracing::trace!(kind = envelope.kind(), delivered, "Envelope published");
    }

    fn apply(&self, event: FeedEvent) -> Option<RelayEnvelope> {
        match event {
            FeedEvent::Connecting => {
                self.feed_state.set_state(ConnectionState::Connecting);
                None
            }
            FeedEvent::Subscribed => {
                self.feed_state.set_state(ConnectionState::Streaming);
                metrics::set_upstream_connected(true);
                tracing::info!("AISStream feed streaming");
                Some(RelayEnvelope::status(STATUS_SUBSCRIBED))
            }
            FeedEvent::Frame(frame) => {
                self.feed_state.increment_messages();
                if let Some(pos) = &frame.position {
                    tracing::debug!(
                        user_id = pos.user_id,
                        latitude = pos.latitude,
                        longitude = pos.longitude,
                        "Position report"
                    );
                }
                Some(RelayEnvelope::ais(frame.payload))
            }
            FeedEvent::Discarded { reason } => {
                self.feed_state.increment_decode_errors();
                tracing::trace!(%reason, "Upstream frame not relayed");
                None
            }
            FeedEvent::Error(message) => {
                tracing::error!(error = %message, "AISStream feed error");
                let envelope = RelayEnvelope::upstream_error(&message);
                self.feed_state.set_error(message);
                Some(envelope)
            }
            FeedEvent::Disconnected => {
                self.feed_state.set_state(ConnectionState::Disconnected);
                metrics::set_upstream_connected(false);
                tracing::warn!("AISStream feed disconnected");
                Some(RelayEnvelope::status(STATUS_DISCONNECTED))
            }
            FeedEvent::Reconnecting { attempt, delay } => {
                self.feed_state.set_state(ConnectionState::Reconnecting);
                self.feed_state.increment_reconnect_attempts();
                tracing::info!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "AISStream feed reconnecting"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::application::ports::MockEnvelopeSink;
    use crate::domain::vessel::InboundFrame;

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<RelayEnvelope>>,
    }

    impl EnvelopeSink for RecordingSink {
        fn publish(&self, envelope: &RelayEnvelope) -> usize {
            self.published.lock().push(envelope.clone());
            1
        }
    }

    fn service() -> (RelayService<RecordingSink>, Arc<RecordingSink>, Arc<FeedState>) {
        let sink = Arc::new(RecordingSink::default());
        let state = Arc::new(FeedState::new());
        (
            RelayService::new(Arc::clone(&sink), Arc::clone(&state)),
            sink,
            state,
        )
    }

    fn frame(user_id: u64) -> FeedEvent {
        FeedEvent::Frame(Box::new(InboundFrame::from_payload(json!({
            "MessageType": "PositionReport",
            "Message": {"PositionReport": {"UserID": user_id, "Latitude": 40.7, "Longitude": -74.0}}
        }))))
    }

    #[test]
    fn frame_is_relayed_verbatim() {
        let (svc, sink, state) = service();
        let payload = json!({
            "MessageType": "PositionReport",
            "Message": {"PositionReport": {"UserID": 123_456_789, "Latitude": 40.70, "Longitude": -74.00}}
        });

        svc.handle(FeedEvent::Frame(Box::new(InboundFrame::from_payload(
            payload.clone(),
        ))));

        assert_eq!(*sink.published.lock(), vec![RelayEnvelope::ais(payload)]);
        assert_eq!(state.get_messages_received(), 1);
    }

    #[test]
    fn disconnect_sequence_broadcasts_status() {
        let (svc, sink, state) = service();

        svc.handle(FeedEvent::Subscribed);
        svc.handle(FeedEvent::Error("connection reset".to_string()));
        svc.handle(FeedEvent::Disconnected);
        svc.handle(FeedEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(3),
        });

        assert_eq!(
            *sink.published.lock(),
            vec![
                RelayEnvelope::status(STATUS_SUBSCRIBED),
                RelayEnvelope::status("AISStream error: connection reset"),
                RelayEnvelope::status(STATUS_DISCONNECTED),
            ]
        );
        assert_eq!(state.get_state(), ConnectionState::Reconnecting);
        assert_eq!(state.get_reconnect_attempts(), 1);
        assert_eq!(state.get_last_error().as_deref(), Some("connection reset"));
    }

    #[test]
    fn discarded_frames_are_never_published() {
        let mut sink = MockEnvelopeSink::new();
        sink.expect_publish().never();
        let state = Arc::new(FeedState::new());
        let svc = RelayService::new(Arc::new(sink), Arc::clone(&state));

        svc.handle(FeedEvent::Discarded {
            reason: "expected value at line 1 column 1".to_string(),
        });
        svc.handle(FeedEvent::Connecting);

        assert_eq!(state.get_decode_errors(), 1);
        assert_eq!(state.get_state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn run_preserves_arrival_order() {
        let (svc, sink, _state) = service();
        let (tx, rx) = mpsc::channel(16);

        for id in 1..=5 {
            tx.send(frame(id)).await.unwrap();
        }
        drop(tx);
        svc.run(rx).await;

        let ids: Vec<u64> = sink
            .published
            .lock()
            .iter()
            .filter_map(|env| match env {
                RelayEnvelope::Ais { payload } => {
                    payload["Message"]["PositionReport"]["UserID"].as_u64()
                }
                RelayEnvelope::Status { .. } => None,
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }
}
