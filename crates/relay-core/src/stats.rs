//! Relay counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters updated by the relay.
#[derive(Debug, Default)]
pub struct RelayStats {
    connections_accepted: AtomicU64,
    connections_closed: AtomicU64,
    messages_received: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Connections registered since startup.
    pub connections_accepted: u64,
    /// Connections removed since startup.
    pub connections_closed: u64,
    /// Messages received from open connections.
    pub messages_received: u64,
    /// Successful hand-offs to a recipient's outbound path.
    pub deliveries: u64,
    /// Hand-offs that failed and were skipped.
    pub delivery_failures: u64,
}

impl RelayStats {
    pub(crate) fn record_accept(&self) {
        let _ = self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_close(&self) {
        let _ = self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message(&self, delivered: usize, failed: usize) {
        let _ = self.messages_received.fetch_add(1, Ordering::Relaxed);
        let _ = self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
        let _ = self
            .delivery_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}
