//! [`ConnectionRegistry`] – who is connected, and in which role.
//!
//! Every accepted transport connection is registered with a bounded
//! outbound queue.  The connection task drains that queue into its socket;
//! everything else in the process only ever talks to the registry.
//!
//! Sends are fire-and-forget: a closed connection is skipped and a full
//! queue drops the frame instead of blocking the caller.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use nexus_types::{ConnectionId, ConnectionRole};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

/// Default per-connection outbound queue depth.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

struct Peer {
    addr: SocketAddr,
    role: Option<ConnectionRole>,
    tx: mpsc::Sender<Message>,
}

/// Registry of open connections and their optional declared role.
#[derive(Default)]
pub struct ConnectionRegistry {
    peers: RwLock<HashMap<ConnectionId, Peer>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection with no declared role.
    ///
    /// Returns the receiving half of its outbound queue, to be drained by
    /// the connection task.
    pub fn add(
        &self,
        id: ConnectionId,
        addr: SocketAddr,
        capacity: usize,
    ) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.write().insert(
            id,
            Peer {
                addr,
                role: None,
                tx,
            },
        );
        info!(conn = %id, peer = %addr, "connection registered");
        rx
    }

    /// Remove a connection.  Returns the role it held, if any.
    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionRole> {
        let peer = self.write().remove(&id)?;
        info!(conn = %id, peer = %peer.addr, role = ?peer.role, "connection removed");
        peer.role
    }

    /// Declare the role of a connection.  Re-declaring replaces the old
    /// role.  Returns `false` for unknown connections.
    pub fn set_role(&self, id: ConnectionId, role: ConnectionRole) -> bool {
        match self.write().get_mut(&id) {
            Some(peer) => {
                peer.role = Some(role);
                info!(conn = %id, peer = %peer.addr, %role, "role declared");
                true
            }
            None => false,
        }
    }

    /// Declared role of `id`, if registered and declared.
    pub fn role_of(&self, id: ConnectionId) -> Option<ConnectionRole> {
        self.read().get(&id).and_then(|p| p.role)
    }

    /// Open connections that declared `role`.
    pub fn with_role(&self, role: ConnectionRole) -> Vec<ConnectionId> {
        self.read()
            .iter()
            .filter(|(_, p)| p.role == Some(role) && !p.tx.is_closed())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Every open connection.
    pub fn open_connections(&self) -> Vec<ConnectionId> {
        self.read()
            .iter()
            .filter(|(_, p)| !p.tx.is_closed())
            .map(|(id, _)| *id)
            .collect()
    }

    /// `true` when `id` is registered and its connection task is alive.
    pub fn is_open(&self, id: ConnectionId) -> bool {
        self.read().get(&id).is_some_and(|p| !p.tx.is_closed())
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Queue `msg` for `id`.
    ///
    /// Returns `true` when the frame was queued.  Closed or unknown
    /// connections and full queues return `false` without error.
    pub fn send(&self, id: ConnectionId, msg: Message) -> bool {
        let peers = self.read();
        let Some(peer) = peers.get(&id) else {
            return false;
        };
        match peer.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(conn = %id, "outbound queue full; frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Peer>> {
        self.peers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Peer>> {
        self.peers.write().unwrap_or_else(|e| e.into_inner())
    }
}
