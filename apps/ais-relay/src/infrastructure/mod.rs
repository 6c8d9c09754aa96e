//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// AISStream WebSocket client (upstream).
pub mod aisstream;

/// Envelope fan-out to connected viewers.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Viewer WebSocket server (downstream).
pub mod downstream;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Connected viewer registry.
pub mod registry;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
