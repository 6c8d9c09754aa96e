//! Relay Composition Root
//!
//! Wires the upstream client, relay service, broadcaster, viewer server and
//! health server together. Binding and running are separate steps so
//! callers can learn the bound addresses (port 0 in tests) before any
//! traffic flows.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::services::RelayService;
use crate::domain::feed::{FeedEvent, FeedState};
use crate::infrastructure::aisstream::{
    AisStreamClient, AisStreamClientConfig, AisStreamClientError, ReconnectConfig,
};
use crate::infrastructure::broadcast::{Broadcaster, SharedBroadcaster};
use crate::infrastructure::config::RelayConfig;
use crate::infrastructure::downstream::{DownstreamError, DownstreamServer};
use crate::infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
use crate::infrastructure::registry::ClientRegistry;

/// Relay startup errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Viewer listener failed.
    #[error(transparent)]
    Downstream(#[from] DownstreamError),

    /// Health listener failed.
    #[error(transparent)]
    Health(#[from] HealthServerError),

    /// Upstream client gave up.
    #[error(transparent)]
    Upstream(#[from] AisStreamClientError),
}

/// A bound, not yet running relay.
pub struct Relay {
    config: RelayConfig,
    registry: Arc<ClientRegistry>,
    broadcaster: SharedBroadcaster,
    feed_state: Arc<FeedState>,
    downstream: DownstreamServer,
    health: Option<HealthServer>,
}

impl Relay {
    /// Bind the viewer listener and, if enabled, the health listener.
    ///
    /// # Errors
    ///
    /// Returns `RelayError` if either address cannot be bound.
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry)));
        let feed_state = Arc::new(FeedState::new());

        let downstream = DownstreamServer::bind(config.relay_addr(), Arc::clone(&registry)).await?;

        let health = match config.health_addr() {
            Some(addr) => {
                let state = Arc::new(HealthServerState::new(
                    env!("CARGO_PKG_VERSION").to_string(),
                    Arc::clone(&feed_state),
                    Arc::clone(&broadcaster),
                ));
                Some(HealthServer::bind(addr, state).await?)
            }
            None => None,
        };

        Ok(Self {
            config,
            registry,
            broadcaster,
            feed_state,
            downstream,
            health,
        })
    }

    /// Address viewers connect to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.downstream.local_addr()
    }

    /// Address of the health server, if enabled.
    #[must_use]
    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.health.as_ref().map(HealthServer::local_addr)
    }

    /// Connected viewers.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Upstream connection state.
    #[must_use]
    pub const fn feed_state(&self) -> &Arc<FeedState> {
        &self.feed_state
    }

    /// Envelope fan-out.
    #[must_use]
    pub const fn broadcaster(&self) -> &SharedBroadcaster {
        &self.broadcaster
    }

    /// Run until the token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Upstream` if the upstream client gives up, which
    /// only happens with a reconnect limit configured. The token is
    /// cancelled first so every other task stops too.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), RelayError> {
        let (event_tx, event_rx) =
            mpsc::channel::<FeedEvent>(self.config.upstream.event_channel_capacity);

        let client_config =
            AisStreamClientConfig::new(self.config.upstream.url.clone(), self.config.subscription())
                .with_reconnect(ReconnectConfig::from_settings(&self.config.reconnect));
        let client = Arc::new(AisStreamClient::new(client_config, event_tx, cancel.clone()));

        let service = RelayService::new(
            Arc::clone(&self.broadcaster),
            Arc::clone(&self.feed_state),
        );
        let service_task = tokio::spawn(service.run(event_rx));

        let client_cancel = cancel.clone();
        let client_task = tokio::spawn(async move {
            let result = client.run().await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "AISStream client stopped");
                client_cancel.cancel();
            }
            result
        });

        let health_task = self.health.map(|server| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run(cancel).await {
                    tracing::error!(error = %e, "Health server error");
                }
            })
        });

        tracing::info!(
            upstream = %self.config.upstream.url,
            boxes = self.config.upstream.bounding_boxes.len(),
            message_types = ?self.config.upstream.filter_message_types,
            "Relay running"
        );

        self.downstream.run(cancel).await;

        let upstream = client_task.await;
        let _ = service_task.await;
        if let Some(task) = health_task {
            let _ = task.await;
        }

        tracing::info!(
            viewers = self.registry.len(),
            stats = ?self.broadcaster.stats(),
            "Relay stopped"
        );

        match upstream {
            Ok(result) => result.map_err(RelayError::from),
            Err(e) => {
                tracing::error!(error = %e, "AISStream client task panicked");
                Ok(())
            }
        }
    }
}
