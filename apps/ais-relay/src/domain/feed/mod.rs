//! Upstream Feed Lifecycle
//!
//! Events emitted by the upstream client and the shared state the relay
//! service keeps about the feed.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Streaming ──┐
//!      ▲                │             ▲  │    │ frame
//!      │   connect fail │             └──┘◄───┘
//!      │                ▼                │ close / error
//!      └──────── Reconnecting ◄──────────┘
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::vessel::InboundFrame;

/// Connection state of the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    #[default]
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Subscribed and receiving frames.
    Streaming,
    /// Waiting out the reconnect delay.
    Reconnecting,
}

impl ConnectionState {
    /// State name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Events emitted by the upstream client, in the order they happen.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A connection attempt is starting.
    Connecting,
    /// Connected and the subscription request has been sent.
    Subscribed,
    /// A decoded upstream frame.
    Frame(Box<InboundFrame>),
    /// An upstream frame could not be decoded and was dropped.
    Discarded {
        /// Decode failure description.
        reason: String,
    },
    /// Transport error on the upstream connection.
    Error(String),
    /// The upstream connection is gone.
    Disconnected,
    /// A reconnect is scheduled.
    Reconnecting {
        /// Reconnection attempt number (1-based).
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
}

/// Observable state of the upstream feed.
#[derive(Debug, Default)]
pub struct FeedState {
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
    decode_errors: AtomicU64,
}

impl FeedState {
    /// Create a new feed state in `Disconnected`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection state.
    ///
    /// Entering `Streaming` records the connect time and clears the
    /// reconnect counter and last error.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Streaming {
            *self.last_connected_at.write() = Some(Utc::now());
            self.reconnect_attempts.store(0, Ordering::Relaxed);
            *self.last_error.write() = None;
        }
    }

    /// Record a transport error.
    pub fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    /// Increment reconnect attempts.
    pub fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment messages received counter.
    pub fn increment_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment decode error counter.
    pub fn increment_decode_errors(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current connection state.
    #[must_use]
    pub fn get_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the feed is currently streaming.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.get_state() == ConnectionState::Streaming
    }

    /// Time of the last successful subscription.
    #[must_use]
    pub fn get_last_connected_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connected_at.read()
    }

    /// Last transport error since the feed was last streaming.
    #[must_use]
    pub fn get_last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Get reconnect attempts since the feed was last streaming.
    #[must_use]
    pub fn get_reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Get messages received count.
    #[must_use]
    pub fn get_messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Get decode error count.
    #[must_use]
    pub fn get_decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }
}
