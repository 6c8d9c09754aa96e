#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! AIS Relay - Vessel Position Feed Fan-out
//!
//! Maintains a single subscription to AISStream's vessel position feed and
//! relays every message to any number of local WebSocket viewers, so a
//! browser map never needs to hold the upstream API key.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `geo`: Coordinates and bounding boxes
//!   - `vessel`: Inbound frames and position reports
//!   - `envelope`: Messages sent to viewers
//!   - `feed`: Upstream events and connection state
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Envelope sink interface
//!   - `services`: Feed event to envelope translation
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `aisstream`: Upstream WebSocket client
//!   - `registry`: Connected viewers
//!   - `broadcast`: Envelope fan-out
//!   - `downstream`: Viewer WebSocket server
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                    FeedEvent          RelayEnvelope
//! AISStream WS ---> AisStreamClient ---> RelayService ---> Broadcaster --+--> Viewer 1
//!                   (mpsc, FIFO)                                         +--> Viewer 2
//!                                                                        +--> Viewer N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Composition root.
pub mod relay;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::envelope::RelayEnvelope;
pub use domain::feed::{ConnectionState, FeedEvent, FeedState};
pub use domain::geo::{BoundingBox, Coordinate, GeoError};
pub use domain::vessel::{InboundFrame, PositionReport};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, ReconnectSettings, RelayConfig, ServerSettings, UpstreamSettings,
};

// Upstream
pub use infrastructure::aisstream::{ApiKey, SubscriptionRequest};

// Viewers
pub use infrastructure::broadcast::{BroadcastStats, Broadcaster};
pub use infrastructure::registry::{ClientId, ClientRegistry};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

// Relay
pub use relay::{Relay, RelayError};
