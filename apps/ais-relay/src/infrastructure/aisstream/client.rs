//! AISStream WebSocket Client
//!
//! Holds the relay's single upstream connection.
//!
//! # Stream URL
//!
//! - Production: `wss://stream.aisstream.io/v0/stream`
//!
//! # Protocol
//!
//! 1. Connect to the WebSocket endpoint
//! 2. Send the subscription request as the first frame (the server closes
//!    connections that do not subscribe within a few seconds)
//! 3. Receive one JSON object per frame until the connection drops
//!
//! On any close or transport error the client waits out the reconnect
//! delay and starts again from step 1. There is no heartbeat: a
//! connection that stays open but goes silent is not detected.

use std::sync::Arc;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::{self, CodecError, JsonCodec};
use super::messages::SubscriptionRequest;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::feed::FeedEvent;
use crate::domain::vessel::InboundFrame;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the AISStream client.
#[derive(Debug, thiserror::Error)]
pub enum AisStreamClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The feed event receiver was dropped.
    #[error("feed event channel closed")]
    ChannelClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,
}

impl AisStreamClientError {
    /// Reason to report to viewers, for failures that are not a plain close.
    fn transport_reason(&self) -> Option<String> {
        match self {
            Self::WebSocket(e) => Some(e.to_string()),
            Self::Codec(e) => Some(e.to_string()),
            Self::ChannelClosed | Self::MaxReconnectAttemptsExceeded(_) | Self::ConnectionClosed => {
                None
            }
        }
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for the AISStream client.
#[derive(Debug, Clone)]
pub struct AisStreamClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// Subscription sent on every connection.
    pub subscription: SubscriptionRequest,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl AisStreamClientConfig {
    /// Create a new configuration with the default reconnect policy.
    #[must_use]
    pub fn new(url: impl Into<String>, subscription: SubscriptionRequest) -> Self {
        Self {
            url: url.into(),
            subscription,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Replace the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

// =============================================================================
// AISStream Client
// =============================================================================

/// AISStream WebSocket client.
///
/// Emits `FeedEvent`s in the order things happen on the wire. Exactly one
/// connection is open at a time.
pub struct AisStreamClient {
    config: AisStreamClientConfig,
    codec: JsonCodec,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
}

impl AisStreamClient {
    /// Create a new AISStream client.
    #[must_use]
    pub const fn new(
        config: AisStreamClientConfig,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            codec: JsonCodec::new(),
            event_tx,
            cancel,
        }
    }

    /// Run the connection loop.
    ///
    /// Returns when cancelled or when the event receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns `MaxReconnectAttemptsExceeded` if a reconnect limit is
    /// configured and reached.
    pub async fn run(self: Arc<Self>) -> Result<(), AisStreamClientError> {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("AISStream client cancelled");
                return Ok(());
            }

            let error = match self.connect_and_run(&mut reconnect_policy).await {
                Ok(()) => {
                    tracing::info!("AISStream client cancelled");
                    return Ok(());
                }
                Err(AisStreamClientError::ChannelClosed) => {
                    tracing::info!("Feed event receiver dropped, stopping AISStream client");
                    return Ok(());
                }
                Err(e) => e,
            };

            tracing::warn!(error = %error, "AISStream connection lost");

            if let Some(reason) = error.transport_reason()
                && self.emit(FeedEvent::Error(reason)).await.is_err()
            {
                return Ok(());
            }
            if self.emit(FeedEvent::Disconnected).await.is_err() {
                return Ok(());
            }

            let Some(delay) = reconnect_policy.next_delay() else {
                return Err(AisStreamClientError::MaxReconnectAttemptsExceeded(
                    reconnect_policy.attempt_count(),
                ));
            };
            let attempt = reconnect_policy.attempt_count();
            metrics::record_reconnect();
            tracing::info!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting to AISStream"
            );

            if self
                .emit(FeedEvent::Reconnecting { attempt, delay })
                .await
                .is_err()
            {
                return Ok(());
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("AISStream client cancelled during reconnect delay");
                    return Ok(());
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Connect, subscribe and stream until the connection ends.
    ///
    /// `Ok(())` means cancellation; every other exit is an error.
    async fn connect_and_run(
        &self,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<(), AisStreamClientError> {
        self.emit(FeedEvent::Connecting).await?;
        tracing::info!(url = %self.config.url, "Connecting to AISStream");

        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(self.config.url.as_str()) => result?,
        };
        tracing::info!("Connected to AISStream");

        let (mut write, mut read) = ws_stream.split();

        self.send_subscription(&mut write).await?;
        reconnect_policy.reset();
        self.emit(FeedEvent::Subscribed).await?;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let decoded = self.codec.decode(text.as_str());
                            self.handle_frame(decoded, text.as_bytes()).await?;
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            let decoded = self.codec.decode_bytes(&bytes);
                            self.handle_frame(decoded, &bytes).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "AISStream sent close frame");
                            return Err(AisStreamClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Ping/Pong are answered by tungstenite
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("AISStream stream ended");
                            return Err(AisStreamClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Send the subscription request as the first frame.
    async fn send_subscription<W>(&self, write: &mut W) -> Result<(), AisStreamClientError>
    where
        W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let subscription = &self.config.subscription;
        let json = self.codec.encode(subscription)?;

        write.send(Message::Text(json.into())).await?;

        tracing::info!(
            bounding_boxes = subscription.bounding_boxes.len(),
            message_types = ?subscription.filter_message_types,
            "Sent subscription request"
        );
        Ok(())
    }

    /// Forward a decoded frame, or record and drop a malformed one.
    async fn handle_frame(
        &self,
        decoded: Result<InboundFrame, CodecError>,
        raw: &[u8],
    ) -> Result<(), AisStreamClientError> {
        match decoded {
            Ok(frame) => {
                metrics::record_upstream_message(message_type_label(
                    frame.message_type.as_deref(),
                    &self.config.subscription.filter_message_types,
                ));
                tracing::trace!(message_type = frame.type_label(), "Upstream frame");
                self.emit(FeedEvent::Frame(Box::new(frame))).await
            }
            Err(e) => {
                metrics::record_decode_error();
                tracing::warn!(
                    error = %e,
                    len = raw.len(),
                    sample = %codec::sample(raw),
                    "Discarding malformed upstream frame"
                );
                self.emit(FeedEvent::Discarded {
                    reason: e.to_string(),
                })
                .await
            }
        }
    }

    async fn emit(&self, event: FeedEvent) -> Result<(), AisStreamClientError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| AisStreamClientError::ChannelClosed)
    }
}

/// Metric label for an upstream message type. Only subscribed types are
/// used verbatim so the label set stays bounded.
fn message_type_label<'a>(message_type: Option<&'a str>, subscribed: &[String]) -> &'a str {
    match message_type {
        Some(t) if subscribed.iter().any(|s| s == t) => t,
        Some(_) => "other",
        None => "unknown",
    }
}
