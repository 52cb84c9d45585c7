//! The live set of open connections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::connection::{ConnectionId, Payload, PeerConnection};
use crate::error::PeerSendError;

/// Result of one fan-out pass over the registry.
#[derive(Debug, Default)]
pub struct FanOut {
    /// Open peers other than the sender at the moment of the pass.
    pub recipients: usize,
    /// Peers whose outbound path accepted the payload.
    pub delivered: usize,
    /// Peers whose outbound path rejected the payload.
    pub failures: Vec<(ConnectionId, PeerSendError)>,
}

/// Registry of open connections, keyed by connection ID.
///
/// Inserts and removals take the write lock; a fan-out pass holds the read
/// lock for the whole pass, so it never observes a half-applied mutation.
/// Sends made under the lock are non-blocking enqueues.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<dyn PeerConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Open and register a connection.
    ///
    /// Returns `false` (and registers nothing) if the connection was not in
    /// the `Connecting` state, so a closed connection is never re-added.
    pub fn insert(&self, connection: Arc<dyn PeerConnection>) -> bool {
        let mut conns = self.connections.write();
        if !connection.mark_open() {
            return false;
        }
        let _ = conns.insert(connection.id().clone(), connection);
        true
    }

    /// Remove a connection. Removing an absent ID is a no-op.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<dyn PeerConnection>> {
        self.connections.write().remove(id)
    }

    /// Look up a registered connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<dyn PeerConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Send `payload` to every open connection except `sender`.
    pub fn fan_out(&self, sender: &ConnectionId, payload: &Payload) -> FanOut {
        let conns = self.connections.read();
        let mut outcome = FanOut::default();
        for (id, conn) in conns.iter() {
            if id == sender || !conn.is_open() {
                continue;
            }
            outcome.recipients += 1;
            match conn.send(payload.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(e) => outcome.failures.push((id.clone(), e)),
            }
        }
        outcome
    }

    /// Remove and return every registered connection.
    pub fn drain(&self) -> Vec<Arc<dyn PeerConnection>> {
        self.connections.write().drain().map(|(_, c)| c).collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
