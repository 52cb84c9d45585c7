//! Connection lifecycle handlers and message fan-out.

use std::fmt::Display;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::connection::{ConnectionId, Payload, PeerConnection};
use crate::registry::ConnectionRegistry;
use crate::stats::{RelayStats, StatsSnapshot};

/// Summary of one `on_message` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Open peers other than the sender.
    pub recipients: usize,
    /// Peers the payload was handed to.
    pub delivered: usize,
    /// Peers whose delivery failed and was skipped.
    pub failed: usize,
}

/// The relay: owns the registry and implements accept, message and close
/// handling. Transport-agnostic; the server drives it from per-connection
/// tasks.
pub struct Relay {
    registry: ConnectionRegistry,
    stats: RelayStats,
}

impl Relay {
    /// Create a relay with an empty registry.
    pub fn new() -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            stats: RelayStats::default(),
        }
    }

    /// Register a newly accepted connection.
    ///
    /// Returns `false` if the connection had already left `Connecting`; it
    /// is then not registered.
    pub fn on_connect(&self, connection: Arc<dyn PeerConnection>) -> bool {
        let id = connection.id().clone();
        if !self.registry.insert(connection) {
            warn!(conn_id = %id, "refusing to register connection that is not connecting");
            return false;
        }
        self.stats.record_accept();
        info!(conn_id = %id, connections = self.registry.len(), "client connected");
        true
    }

    /// Forward `payload` from `sender` to every other open connection.
    ///
    /// Per-peer failures are logged and skipped. Peers that turn out to be
    /// closed are removed once the pass is over.
    pub fn on_message(&self, sender: &ConnectionId, payload: Payload) -> BroadcastReport {
        match self.registry.get(sender) {
            Some(conn) if conn.is_open() => {}
            _ => {
                debug!(conn_id = %sender, "dropping message from connection that is not open");
                return BroadcastReport::default();
            }
        }

        info!(
            conn_id = %sender,
            kind = payload.kind(),
            len = payload.len(),
            payload = %payload.preview(),
            "message received"
        );

        let outcome = self.registry.fan_out(sender, &payload);
        let report = BroadcastReport {
            recipients: outcome.recipients,
            delivered: outcome.delivered,
            failed: outcome.failures.len(),
        };

        for (peer, err) in &outcome.failures {
            warn!(
                conn_id = %sender,
                peer_id = %peer,
                error = %err,
                error_kind = err.error_kind(),
                "failed to relay message to peer"
            );
        }
        for (peer, _) in outcome.failures.iter().filter(|(_, e)| e.is_disconnect()) {
            self.remove(peer, "peer closed during broadcast");
        }

        self.stats.record_message(report.delivered, report.failed);
        debug!(
            conn_id = %sender,
            recipients = report.recipients,
            delivered = report.delivered,
            failed = report.failed,
            "broadcast complete"
        );
        report
    }

    /// Remove a connection that closed cleanly. Idempotent.
    pub fn on_close(&self, id: &ConnectionId) {
        self.remove(id, "client disconnected");
    }

    /// Remove a connection that failed. Handled exactly like a close; other
    /// peers are not told.
    pub fn on_error(&self, id: &ConnectionId, error: &dyn Display) {
        if self.registry.contains(id) {
            warn!(conn_id = %id, error = %error, "connection error");
        }
        self.remove(id, "client dropped after error");
    }

    /// Close and remove every connection (server shutdown).
    pub fn close_all(&self) -> usize {
        let drained = self.registry.drain();
        for conn in &drained {
            if let Err(e) = conn.close() {
                debug!(conn_id = %conn.id(), error = %e, "close during shutdown failed");
            }
            self.stats.record_close();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "closed all connections");
        }
        drained.len()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether `id` is currently registered.
    pub fn is_registered(&self, id: &ConnectionId) -> bool {
        self.registry.contains(id)
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn remove(&self, id: &ConnectionId, reason: &'static str) {
        let Some(conn) = self.registry.remove(id) else {
            return;
        };
        if let Err(e) = conn.close() {
            debug!(conn_id = %id, error = %e, "close after removal failed");
        }
        self.stats.record_close();
        info!(conn_id = %id, connections = self.registry.len(), reason, "client removed");
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}
