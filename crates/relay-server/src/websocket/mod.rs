//! WebSocket connections, heartbeat, and the per-connection relay loop.

pub mod connection;
pub mod handler;
pub mod heartbeat;
