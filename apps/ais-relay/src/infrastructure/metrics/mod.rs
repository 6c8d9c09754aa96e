//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Upstream**: messages received by type, decode failures, reconnects,
//!   connection state
//! - **Viewers**: connected viewer count
//! - **Delivery**: envelopes broadcast by kind, per-viewer deliveries and
//!   skips
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Upstream
    describe_counter!(
        "ais_relay_upstream_messages_total",
        "Total messages received from AISStream by subscribed message type (other, unknown otherwise)"
    );
    describe_counter!(
        "ais_relay_decode_errors_total",
        "Total upstream frames discarded as undecodable"
    );
    describe_counter!(
        "ais_relay_reconnects_total",
        "Total upstream reconnection attempts"
    );
    describe_gauge!(
        "ais_relay_upstream_connected",
        "1 while subscribed to AISStream, 0 otherwise"
    );

    // Viewers
    describe_gauge!("ais_relay_viewers", "Number of connected viewers");

    // Delivery
    describe_counter!(
        "ais_relay_envelopes_total",
        "Total envelopes broadcast by kind"
    );
    describe_counter!(
        "ais_relay_deliveries_total",
        "Total envelopes queued to viewers"
    );
    describe_counter!(
        "ais_relay_deliveries_skipped_total",
        "Total deliveries skipped because the viewer had closed"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a decoded upstream message.
pub fn record_upstream_message(message_type: &str) {
    counter!(
        "ais_relay_upstream_messages_total",
        "message_type" => message_type.to_string()
    )
    .increment(1);
}

/// Record an undecodable upstream frame.
pub fn record_decode_error() {
    counter!("ais_relay_decode_errors_total").increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect() {
    counter!("ais_relay_reconnects_total").increment(1);
}

/// Update the upstream connection state.
pub fn set_upstream_connected(connected: bool) {
    gauge!("ais_relay_upstream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the connected viewer count.
#[allow(clippy::cast_precision_loss)]
pub fn set_viewers(count: usize) {
    gauge!("ais_relay_viewers").set(count as f64);
}

/// Record one broadcast envelope and its per-viewer outcome.
pub fn record_envelope(kind: &'static str, delivered: u64, skipped: u64) {
    counter!("ais_relay_envelopes_total", "kind" => kind).increment(1);
    counter!("ais_relay_deliveries_total").increment(delivered);
    if skipped > 0 {
        counter!("ais_relay_deliveries_skipped_total").increment(skipped);
    }
}

// =============================================================================
// Tests
// =============================================================================
