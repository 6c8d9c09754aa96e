//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, upstream status reporting, and
//! Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (200 while subscribed upstream)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::feed::{ConnectionState, FeedState};
use crate::infrastructure::broadcast::{BroadcastStats, SharedBroadcaster};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream feed status.
    pub upstream: UpstreamInfo,
    /// Connected viewer count.
    pub viewers: usize,
    /// Delivery counters.
    pub broadcast: BroadcastStats,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Subscribed and streaming.
    Healthy,
    /// Connecting or waiting to reconnect.
    Degraded,
    /// Not connected.
    Unhealthy,
}

impl From<ConnectionState> for HealthStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Streaming => Self::Healthy,
            ConnectionState::Connecting | ConnectionState::Reconnecting => Self::Degraded,
            ConnectionState::Disconnected => Self::Unhealthy,
        }
    }
}

/// Upstream feed status.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamInfo {
    /// Connection state.
    pub state: ConnectionState,
    /// Whether the relay is subscribed.
    pub connected: bool,
    /// Time of the last successful subscription.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent upstream error.
    pub last_error: Option<String>,
    /// Frames forwarded.
    pub messages_received: u64,
    /// Frames discarded as undecodable.
    pub decode_errors: u64,
    /// Reconnect attempts since the last subscription.
    pub reconnect_attempts: u32,
}

impl From<&FeedState> for UpstreamInfo {
    fn from(state: &FeedState) -> Self {
        let connection_state = state.get_state();
        Self {
            state: connection_state,
            connected: connection_state == ConnectionState::Streaming,
            last_connected_at: state.get_last_connected_at(),
            last_error: state.get_last_error(),
            messages_received: state.get_messages_received(),
            decode_errors: state.get_decode_errors(),
            reconnect_attempts: state.get_reconnect_attempts(),
        }
    }
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    feed_state: Arc<FeedState>,
    broadcaster: SharedBroadcaster,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        feed_state: Arc<FeedState>,
        broadcaster: SharedBroadcaster,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            feed_state,
            broadcaster,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<HealthServerState>,
}

impl HealthServer {
    /// Bind the health listener.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError::BindFailed` if the address is unavailable.
    pub async fn bind(
        addr: SocketAddr,
        state: Arc<HealthServerState>,
    ) -> Result<Self, HealthServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(addr, e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| HealthServerError::BindFailed(addr, e.to_string()))?;

        Ok(Self {
            listener,
            local_addr,
            state,
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError::ServerFailed` if the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        tracing::info!(addr = %self.local_addr, "Health server listening");

        axum::serve(self.listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.feed_state.is_streaming() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let upstream = UpstreamInfo::from(state.feed_state.as_ref());

    HealthResponse {
        status: HealthStatus::from(upstream.state),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        upstream,
        viewers: state.broadcaster.registry().len(),
        broadcast: state.broadcaster.stats(),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind the listener.
    #[error("failed to bind {0}: {1}")]
    BindFailed(SocketAddr, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
