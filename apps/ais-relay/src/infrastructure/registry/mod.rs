//! Client Registry
//!
//! The set of viewers currently connected to the relay. Entries are added
//! when a viewer's WebSocket handshake completes and removed when its
//! connection ends; nothing else mutates the set.
//!
//! Each entry holds the sending half of that viewer's outbound queue. The
//! connection task owns the receiving half and the socket, so writing to
//! the registry never touches a socket directly.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::infrastructure::metrics;

/// Unique identifier for a viewer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a new random ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to one viewer's outbound queue.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Message>,
}

impl ClientHandle {
    /// Create a handle for a newly accepted viewer.
    #[must_use]
    pub fn new(peer: SocketAddr, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: ClientId::new(),
            peer,
            tx,
        }
    }

    /// Connection ID.
    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    /// Remote address.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the connection task is still draining the queue.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a message. Returns `false` if the connection has gone away.
    pub fn send(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Set of connected viewers.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, ClientHandle>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a viewer. Callers must not register the same handle twice.
    pub fn register(&self, handle: ClientHandle) {
        let count = {
            let mut clients = self.clients.write();
            clients.insert(handle.id(), handle);
            clients.len()
        };
        metrics::set_viewers(count);
    }

    /// Remove a viewer. Removing an unknown ID is a no-op.
    ///
    /// Returns `true` if an entry was removed.
    pub fn deregister(&self, id: ClientId) -> bool {
        let (removed, count) = {
            let mut clients = self.clients.write();
            let removed = clients.remove(&id).is_some();
            (removed, clients.len())
        };
        metrics::set_viewers(count);
        removed
    }

    /// Copy of the current entries. The lock is released before returning.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        self.clients.read().values().cloned().collect()
    }

    /// Whether a viewer is registered.
    #[must_use]
    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.read().contains_key(&id)
    }

    /// Number of registered viewers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Whether no viewers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}
