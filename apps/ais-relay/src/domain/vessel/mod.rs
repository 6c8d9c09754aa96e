//! Vessel Types
//!
//! The relay forwards upstream objects verbatim; the only structure it
//! looks into is the position report, which it extracts for logging and
//! counting. Everything else in the payload stays opaque.

use serde::{Deserialize, Serialize};

/// Message type tag used by AISStream for position reports.
pub const POSITION_REPORT: &str = "PositionReport";

/// A vessel position report (AIS message types 1, 2 and 3).
///
/// Only the fields the relay inspects are modelled; unknown fields are
/// ignored on decode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    /// Maritime Mobile Service Identity of the reporting vessel.
    #[serde(rename = "UserID")]
    pub user_id: u64,
    /// Latitude in degrees.
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    /// Longitude in degrees.
    #[serde(rename = "Longitude")]
    pub longitude: f64,
}

/// A decoded upstream frame.
///
/// `payload` is the object exactly as received; `message_type` and
/// `position` are views extracted from it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// Value of the top-level `MessageType` field, if it is a string.
    pub message_type: Option<String>,
    /// `Message.PositionReport`, if present and well-formed.
    pub position: Option<PositionReport>,
    /// The verbatim upstream object.
    pub payload: serde_json::Value,
}

impl InboundFrame {
    /// Build a frame from a decoded upstream object.
    #[must_use]
    pub fn from_payload(payload: serde_json::Value) -> Self {
        let message_type = payload
            .get("MessageType")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        let position = payload
            .get("Message")
            .and_then(|m| m.get(POSITION_REPORT))
            .and_then(|pr| PositionReport::deserialize(pr).ok());

        Self {
            message_type,
            position,
            payload,
        }
    }

    /// Label for metrics: the message type, or `unknown`.
    #[must_use]
    pub fn type_label(&self) -> &str {
        self.message_type.as_deref().unwrap_or("unknown")
    }
}
