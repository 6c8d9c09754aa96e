//! AISStream Message Types
//!
//! The only message the relay sends upstream is the subscription request,
//! sent once as the first frame of every connection:
//!
//! ```json
//! {
//!   "APIKey": "<key>",
//!   "BoundingBoxes": [[[40.55, -74.30], [40.90, -73.60]]],
//!   "FilterMessageTypes": ["PositionReport"]
//! }
//! ```
//!
//! Inbound objects are not modelled here; they are forwarded verbatim
//! (see `domain::vessel::InboundFrame`).

use serde::{Serialize, Serializer};

use crate::domain::geo::BoundingBox;
use crate::domain::vessel::POSITION_REPORT;

/// Production AISStream endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://stream.aisstream.io/v0/stream";

/// AISStream API key.
///
/// Serializes as the plain key (it must reach the wire) but never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap an API key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the raw key.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Subscription request sent on every new upstream connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionRequest {
    /// API key.
    #[serde(rename = "APIKey")]
    pub api_key: ApiKey,
    /// Regions to receive reports for.
    pub bounding_boxes: Vec<BoundingBox>,
    /// Message types to receive.
    pub filter_message_types: Vec<String>,
}

impl SubscriptionRequest {
    /// Create a request for position reports inside the given boxes.
    #[must_use]
    pub fn position_reports(api_key: ApiKey, bounding_boxes: Vec<BoundingBox>) -> Self {
        Self {
            api_key,
            bounding_boxes,
            filter_message_types: vec![POSITION_REPORT.to_string()],
        }
    }

    /// Replace the message type filter.
    #[must_use]
    pub fn with_message_types(mut self, types: Vec<String>) -> Self {
        self.filter_message_types = types;
        self
    }
}
