//! # relay-server
//!
//! Axum HTTP + `WebSocket` transport for [`relay_core::Relay`].
//!
//! - `WebSocket` upgrades on `/` and `/ws`, one task per connection
//! - Bounded per-connection outbound queue drained by a writer task
//! - Ping/pong heartbeat that drops silent peers
//! - `/health` endpoint with connection count and relay counters
//! - Graceful shutdown via `CancellationToken` + `TaskTracker`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::RelayServer;
pub use shutdown::ShutdownCoordinator;
