//! # relay-core
//!
//! Transport-agnostic message relay.
//!
//! - [`PeerConnection`]: the capability a transport connection exposes (id,
//!   state, non-blocking send, close)
//! - [`ConnectionRegistry`]: the live set of open connections
//! - [`Relay`]: accept/message/close handlers; fans every message out to all
//!   other open connections and never echoes it to the sender

#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod registry;
pub mod relay;
pub mod stats;

#[cfg(test)]
mod testing;

pub use connection::{ConnectionId, ConnectionState, Payload, PeerConnection, StateCell};
pub use error::{PeerSendError, RelayError, Result};
pub use registry::{ConnectionRegistry, FanOut};
pub use relay::{BroadcastReport, Relay};
pub use stats::{RelayStats, StatsSnapshot};
