//! Broadcaster
//!
//! Fans each relay envelope out to every viewer in the `ClientRegistry`.
//!
//! # Delivery
//!
//! The envelope is serialized once and a copy of the frame is queued on
//! each open viewer's outbound queue. Queues are unbounded and drained by
//! the viewer's own connection task, so a slow viewer never delays the
//! others. The flip side is that a viewer which stops reading grows its
//! own queue until its connection closes; there is no back-pressure.
//!
//! Viewers whose connection has already gone away are skipped without
//! error. The registry is read through a snapshot and never mutated here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;

use crate::application::ports::EnvelopeSink;
use crate::domain::envelope::RelayEnvelope;
use crate::infrastructure::metrics;
use crate::infrastructure::registry::ClientRegistry;

/// Broadcast errors.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    /// Envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Cumulative broadcast counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastStats {
    /// Envelopes broadcast.
    pub envelopes: u64,
    /// Envelope copies queued to viewers.
    pub deliveries: u64,
    /// Viewers skipped because their connection had closed.
    pub skipped: u64,
}

/// Fan-out of envelopes to registered viewers.
#[derive(Debug)]
pub struct Broadcaster {
    registry: Arc<ClientRegistry>,
    envelopes: AtomicU64,
    deliveries: AtomicU64,
    skipped: AtomicU64,
}

/// Shared broadcaster handle.
pub type SharedBroadcaster = Arc<Broadcaster>;

impl Broadcaster {
    /// Create a broadcaster over the given registry.
    #[must_use]
    pub const fn new(registry: Arc<ClientRegistry>) -> Self {
        Self {
            registry,
            envelopes: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Queue an envelope for every open viewer.
    ///
    /// Returns the number of viewers it was queued for.
    ///
    /// # Errors
    ///
    /// Returns `BroadcastError::Encode` if the envelope cannot be serialized;
    /// nothing is sent in that case.
    pub fn broadcast(&self, envelope: &RelayEnvelope) -> Result<usize, BroadcastError> {
        let json = serde_json::to_string(envelope)?;
        let message = Message::Text(json.into());

        let mut delivered: u64 = 0;
        let mut skipped: u64 = 0;
        for client in self.registry.snapshot() {
            if client.is_open() && client.send(message.clone()) {
                delivered += 1;
            } else {
                tracing::trace!(client_id = %client.id(), "Skipping closed viewer");
                skipped += 1;
            }
        }

        self.envelopes.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered, Ordering::Relaxed);
        self.skipped.fetch_add(skipped, Ordering::Relaxed);
        metrics::record_envelope(envelope.kind(), delivered, skipped);

        Ok(usize::try_from(delivered).unwrap_or(usize::MAX))
    }

    /// Get cumulative counters.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            envelopes: self.envelopes.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    /// The registry this broadcaster reads.
    #[must_use]
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }
}

impl EnvelopeSink for Broadcaster {
    fn publish(&self, envelope: &RelayEnvelope) -> usize {
        match self.broadcast(envelope) {
            Ok(delivered) => delivered,
            Err(e) => {
                tracing::error!(error = %e, kind = envelope.kind(), "Broadcast failed");
                0
            }
        }
    }
}
