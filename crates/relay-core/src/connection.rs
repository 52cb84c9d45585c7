//! The connection capability the relay fans out to.
//!
//! The registry never sees a socket. It stores `Arc<dyn PeerConnection>`
//! values, so the WebSocket transport and the in-memory fakes used in tests
//! plug into the same relay logic.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::error::PeerSendError;

/// Unique connection identifier. Never reused.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Mint a fresh, time-ordered identifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a connection: `Connecting → Open → Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Accepted by the transport, not yet registered.
    Connecting,
    /// Registered; may send and receive relayed messages.
    Open,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closed => 2,
        }
    }
}

/// Lock-free holder for a [`ConnectionState`] that enforces the legal
/// transitions. Transport implementations embed one of these.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// A cell in the `Connecting` state.
    pub fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Connecting.as_u8()))
    }

    /// Current state.
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// `Connecting → Open`. Returns `false` if the cell was not `Connecting`.
    pub fn open(&self) -> bool {
        self.0
            .compare_exchange(
                ConnectionState::Connecting.as_u8(),
                ConnectionState::Open.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closed`. Returns `true` only for the call that performed the
    /// transition.
    pub fn close(&self) -> bool {
        self.0.swap(ConnectionState::Closed.as_u8(), Ordering::AcqRel)
            != ConnectionState::Closed.as_u8()
    }

    /// Shorthand for `get() == Open`.
    pub fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// An opaque message. The frame kind is preserved.
///
/// Both variants share one reference-counted buffer, so cloning a payload
/// for each recipient never copies the bytes. `Text` always holds valid
/// UTF-8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// A text frame (UTF-8).
    Text(Bytes),
    /// A binary frame.
    Binary(Bytes),
}

impl Payload {
    /// Build a text payload.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(Bytes::from(text.into()))
    }

    /// Build a binary payload.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Raw bytes of the payload.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(data) | Self::Binary(data) => data,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `"text"` or `"binary"`, for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }

    /// A short printable excerpt for log lines.
    pub fn preview(&self) -> String {
        const MAX: usize = 64;
        match self {
            Self::Text(data) => {
                let text = String::from_utf8_lossy(data);
                if text.chars().count() <= MAX {
                    text.into_owned()
                } else {
                    let head: String = text.chars().take(MAX).collect();
                    format!("{head}…")
                }
            }
            Self::Binary(data) => format!("<{} bytes>", data.len()),
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

/// What the relay needs from a connection: an identity, a state, a
/// non-blocking send and a close.
///
/// `send` must not wait on the network. Implementations enqueue the payload
/// for an independent writer and report `QueueFull` rather than block.
pub trait PeerConnection: Send + Sync {
    /// Stable identity of this connection.
    fn id(&self) -> &ConnectionId;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Transition `Connecting → Open`. Returns `false` if the connection was
    /// not in `Connecting` (a closed connection is never reopened).
    fn mark_open(&self) -> bool;

    /// Hand a payload to this connection's outbound path.
    fn send(&self, payload: Payload) -> Result<(), PeerSendError>;

    /// Close the connection. Idempotent.
    fn close(&self) -> Result<(), PeerSendError>;

    /// Shorthand for `state() == Open`.
    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("conn_"));
    }

    #[test]
    fn connection_id_display_matches_inner() {
        let id = ConnectionId::from("conn_fixed");
        assert_eq!(id.to_string(), "conn_fixed");
    }

    #[test]
    fn state_cell_starts_connecting() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), ConnectionState::Connecting);
        assert!(!cell.is_open());
    }

    #[test]
    fn state_cell_open_then_close() {
        let cell = StateCell::new();
        assert!(cell.open());
        assert!(cell.is_open());
        assert!(cell.close());
        assert_eq!(cell.get(), ConnectionState::Closed);
    }

    #[test]
    fn state_cell_close_is_reported_once() {
        let cell = StateCell::new();
        assert!(cell.open());
        assert!(cell.close());
        assert!(!cell.close());
    }

    #[test]
    fn closed_cell_never_reopens() {
        let cell = StateCell::new();
        assert!(cell.close());
        assert!(!cell.open());
        assert_eq!(cell.get(), ConnectionState::Closed);
    }

    #[test]
    fn open_twice_fails_second_time() {
        let cell = StateCell::new();
        assert!(cell.open());
        assert!(!cell.open());
    }

    #[test]
    fn payload_text_bytes() {
        let p = Payload::from("launch,1200");
        assert_eq!(p.as_bytes(), b"launch,1200");
        assert_eq!(p.len(), 11);
        assert_eq!(p.kind(), "text");
        assert!(!p.is_empty());
    }

    #[test]
    fn payload_binary_bytes() {
        let p = Payload::binary(vec![0u8, 1, 2]);
        assert_eq!(p.as_bytes(), &[0, 1, 2]);
        assert_eq!(p.kind(), "binary");
        assert_eq!(p.preview(), "<3 bytes>");
    }

    #[test]
    fn empty_payload() {
        assert!(Payload::from("").is_empty());
    }

    #[test]
    fn long_text_preview_is_truncated() {
        let p = Payload::from("x".repeat(200));
        let preview = p.preview();
        assert_eq!(preview.chars().count(), 65);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn short_text_preview_is_verbatim() {
        assert_eq!(Payload::from("abort").preview(), "abort");
    }

    #[test]
    fn cloned_text_payload_shares_buffer() {
        let p = Payload::text("setapoapsis,80000");
        let copy = p.clone();
        assert_eq!(p.as_bytes().as_ptr(), copy.as_bytes().as_ptr());
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionState::Open).unwrap();
        assert_eq!(json, "\"open\"");
    }
}
