//! AIS Relay Binary
//!
//! Starts the AISStream relay.
//!
//! # Usage
//!
//! ```bash
//! AIS_API_KEY=... cargo run --bin ais-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `AIS_API_KEY`: AISStream API key
//!
//! ## Optional
//! - `AISSTREAM_URL`: Upstream endpoint (default: wss://stream.aisstream.io/v0/stream)
//! - `AIS_BOUNDING_BOXES`: JSON list of `[[lat, lon], [lat, lon]]` boxes (default: New York harbor)
//! - `AIS_FILTER_MESSAGE_TYPES`: Comma-separated message types (default: PositionReport)
//! - `RELAY_BIND_HOST`: Listener address (default: 0.0.0.0)
//! - `RELAY_PORT`: Viewer WebSocket port (default: 8081)
//! - `RELAY_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8082)
//! - `RELAY_RECONNECT_DELAY_MS`: Delay before reconnecting (default: 3000)
//! - `RELAY_RECONNECT_DELAY_MAX_MS`: Backoff cap, never below the delay (default: the delay)
//! - `RELAY_RECONNECT_MULTIPLIER`: Backoff growth (default: 1.0)
//! - `RELAY_RECONNECT_JITTER`: Random spread per delay, 0 to 1 (default: 0)
//! - `RELAY_MAX_RECONNECT_ATTEMPTS`: 0 = unlimited (default: 0)
//! - `RELAY_EVENT_CHANNEL_CAPACITY`: Upstream event buffer (default: 1024)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: ais-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::time::Duration;

use ais_relay::infrastructure::telemetry;
use ais_relay::{Relay, RelayConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting AIS relay");

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            eprintln!("ais-relay: {e}");
            std::process::exit(1);
        }
    };
    log_config(&config);

    let _metrics_handle = init_metrics()?;

    let relay = Relay::bind(config).await?;
    tracing::info!(addr = %relay.local_addr(), "Relay ready");

    let shutdown_token = CancellationToken::new();
    let mut relay_task = tokio::spawn(relay.run(shutdown_token.clone()));

    tokio::select! {
        () = await_shutdown() => {
            shutdown_token.cancel();
            tracing::info!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Graceful shutdown started"
            );
        }
        result = &mut relay_task => {
            result??;
            tracing::info!("AIS relay stopped");
            return Ok(());
        }
    }

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, relay_task).await {
        Ok(result) => result??,
        Err(_) => tracing::warn!("Shutdown timed out"),
    }

    tracing::info!("AIS relay stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        upstream = %config.upstream.url,
        relay_addr = %config.relay_addr(),
        health_addr = ?config.health_addr(),
        boxes = config.upstream.bounding_boxes.len(),
        message_types = ?config.upstream.filter_message_types,
        "Configuration loaded"
    );
    tracing::debug!(
        delay_initial_ms = u64::try_from(config.reconnect.delay_initial.as_millis()).unwrap_or(u64::MAX),
        delay_max_ms = u64::try_from(config.reconnect.delay_max.as_millis()).unwrap_or(u64::MAX),
        multiplier = config.reconnect.multiplier,
        max_attempts = config.reconnect.max_attempts,
        "Reconnect policy"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
