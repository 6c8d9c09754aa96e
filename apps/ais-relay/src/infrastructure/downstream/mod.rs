//! Downstream WebSocket Server
//!
//! Accepts viewer connections on the local relay port. Any request path is
//! accepted. For each viewer:
//!
//! 1. complete the WebSocket handshake
//! 2. queue `{"type":"status","message":"Connected to local relay"}` as
//!    the first outbound frame
//! 3. register the viewer so broadcasts reach it
//! 4. write queued frames and read (and ignore) inbound frames until the
//!    viewer closes, errors, or the relay shuts down
//! 5. deregister
//!
//! The status frame is queued before registration, so no broadcast can
//! overtake it.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::domain::envelope::{RelayEnvelope, STATUS_CONNECTED};
use crate::infrastructure::registry::{ClientHandle, ClientRegistry};

/// Downstream server errors.
#[derive(Debug, thiserror::Error)]
pub enum DownstreamError {
    /// Failed to bind the listening socket.
    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),

    /// WebSocket handshake with a viewer failed.
    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    /// Greeting could not be encoded.
    #[error("failed to encode greeting: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a viewer connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Viewer,
    ReadError,
    WriteError,
    Shutdown,
}

impl CloseReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "closed by viewer",
            Self::ReadError => "read error",
            Self::WriteError => "write error",
            Self::Shutdown => "relay shutdown",
        }
    }
}

/// Listening endpoint for viewers.
pub struct DownstreamServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<ClientRegistry>,
}

impl DownstreamServer {
    /// Bind the viewer listener.
    ///
    /// # Errors
    ///
    /// Returns `DownstreamError::Bind` if the address is unavailable.
    pub async fn bind(
        addr: SocketAddr,
        registry: Arc<ClientRegistry>,
    ) -> Result<Self, DownstreamError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DownstreamError::Bind(addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DownstreamError::Bind(addr, e))?;

        Ok(Self {
            listener,
            local_addr,
            registry,
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept viewers until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(addr = %self.local_addr, "Relay listening for viewers");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let registry = Arc::clone(&self.registry);
                            let cancel = cancel.clone();
                            tokio::spawn(async move {
                                if let Err(e) = serve_viewer(stream, peer, registry, cancel).await {
                                    tracing::warn!(error = %e, %peer, "Viewer connection failed");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept viewer connection");
                        }
                    }
                }
            }
        }

        tracing::info!("Relay listener stopped");
    }
}

async fn serve_viewer(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ClientRegistry>,
    cancel: CancellationToken,
) -> Result<(), DownstreamError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let greeting = serde_json::to_string(&RelayEnvelope::status(STATUS_CONNECTED))?;
    let _ = tx.send(Message::Text(greeting.into()));

    let handle = ClientHandle::new(peer, tx);
    let client_id = handle.id();
    registry.register(handle);
    tracing::info!(%client_id, %peer, viewers = registry.len(), "Viewer connected");

    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break CloseReason::Shutdown;
            }
            outbound = rx.recv() => {
                let Some(message) = outbound else {
                    break CloseReason::Shutdown;
                };
                if let Err(e) = write.send(message).await {
                    tracing::debug!(%client_id, error = %e, "Viewer write failed");
                    break CloseReason::WriteError;
                }
            }
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break CloseReason::Viewer,
                    Some(Ok(_)) => {
                        // Viewers have nothing to say to the relay
                    }
                    Some(Err(e)) => {
                        tracing::debug!(%client_id, error = %e, "Viewer read failed");
                        break CloseReason::ReadError;
                    }
                }
            }
        }
    };

    registry.deregister(client_id);
    tracing::info!(
        %client_id,
        %peer,
        reason = reason.as_str(),
        viewers = registry.len(),
        "Viewer disconnected"
    );
    Ok(())
}
