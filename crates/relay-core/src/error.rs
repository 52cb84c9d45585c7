//! Relay error types.

use thiserror::Error;

/// Failure to hand a payload to one specific peer.
///
/// Always recovered locally: the broadcast logs it and moves on to the next
/// recipient.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PeerSendError {
    /// The peer's outbound queue is full (slow or stalled reader).
    #[error("outbound queue full")]
    QueueFull,
    /// The peer is closed or its writer has gone away.
    #[error("connection closed")]
    Closed,
    /// The underlying transport rejected the payload.
    #[error("transport error: {0}")]
    Transport(String),
}

impl PeerSendError {
    /// Whether this failure proves the peer can never be delivered to again.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::Closed => "closed",
            Self::Transport(_) => "transport",
        }
    }
}

/// Errors that stop the relay from running.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listening endpoint could not be established.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the relay tried to bind.
        addr: String,
        /// Underlying OS error (address in use, permission denied, ...).
        #[source]
        source: std::io::Error,
    },
    /// The listener was bound but serving failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Build a bind error for `addr`.
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }
}

/// Result type for relay startup operations.
pub type Result<T> = std::result::Result<T, RelayError>;
