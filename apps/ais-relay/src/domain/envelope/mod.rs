//! Relay Envelope
//!
//! The outward message sent to viewers. Viewers dispatch on the `type`
//! field:
//!
//! ```json
//! {"type":"status","message":"Connected to local relay"}
//! {"type":"ais","payload":{"MessageType":"PositionReport", ...}}
//! ```

use serde::Serialize;

/// Sent to each viewer immediately after its connection is accepted.
pub const STATUS_CONNECTED: &str = "Connected to local relay";

/// Broadcast after the subscription request has been sent upstream.
pub const STATUS_SUBSCRIBED: &str = "Subscribed to AISStream";

/// Broadcast when the upstream connection is lost.
pub const STATUS_DISCONNECTED: &str = "AISStream disconnected, reconnecting...";

/// Message sent to viewers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayEnvelope {
    /// Human-readable relay status.
    Status {
        /// Status text.
        message: String,
    },
    /// An upstream object, unmodified.
    Ais {
        /// The verbatim upstream payload.
        payload: serde_json::Value,
    },
}

impl RelayEnvelope {
    /// Create a status envelope.
    #[must_use]
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    /// Status broadcast for an upstream transport error.
    #[must_use]
    pub fn upstream_error(reason: &str) -> Self {
        Self::status(format!("AISStream error: {reason}"))
    }

    /// Wrap an upstream payload.
    #[must_use]
    pub const fn ais(payload: serde_json::Value) -> Self {
        Self::Ais { payload }
    }

    /// Label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Ais { .. } => "ais",
        }
    }
}
