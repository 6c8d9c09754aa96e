//! AISStream WebSocket Adapter
//!
//! Maintains the single upstream subscription to AISStream:
//!
//! - **messages**: subscription request wire format
//! - **codec**: JSON frame decoding
//! - **reconnect**: delay policy between connection attempts
//! - **client**: connect → subscribe → stream loop

pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;

pub use client::{AisStreamClient, AisStreamClientConfig, AisStreamClientError};
pub use codec::{CodecError, JsonCodec};
pub use messages::{ApiKey, DEFAULT_STREAM_URL, SubscriptionRequest};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
