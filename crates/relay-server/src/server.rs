//! `RelayServer`: Axum HTTP + WebSocket listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use relay_core::{Relay, RelayError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::handle_socket;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The relay every connection registers with.
    pub relay: Arc<Relay>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    relay: Arc<Relay>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl RelayServer {
    /// Create a new server with an empty relay.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            relay: Arc::new(Relay::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    ///
    /// `/` and `/ws` both accept WebSocket upgrades.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the listener and start serving in the background.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    /// The task finishes once the shutdown token fires and every open
    /// connection has been closed.
    pub async fn listen(&self) -> relay_core::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RelayError::bind(addr.clone(), e))?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let relay = self.relay.clone();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                token.cancelled().await;
                let closed = relay.close_all();
                info!(closed, "closing connections");
            });
            if let Err(e) = serve.await {
                error!(error = %e, "relay server stopped with error");
            }
        });

        info!(addr = %local_addr, "relay listening");
        Ok((local_addr, handle))
    }

    /// Get the relay.
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET `/` and `/ws`: upgrade to a relayed WebSocket.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }

    let AppState {
        relay,
        config,
        shutdown,
        ..
    } = state;
    let max = config.max_message_size;
    let token = shutdown.token();
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| {
            shutdown
                .connections()
                .track_future(handle_socket(socket, relay, config, token))
        })
}

/// GET `/health`
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.relay.connection_count(),
        state.relay.stats(),
        state.shutdown.is_shutting_down(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_server() -> RelayServer {
        RelayServer::new(ServerConfig::default())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.relay().connection_count(), 0);
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["stats"]["messages_received"], 0);
    }

    #[tokio::test]
    async fn health_reports_shutdown() {
        let server = make_server();
        server.shutdown().shutdown();
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "shutting_down");
    }

    #[tokio::test]
    async fn plain_get_on_ws_routes_is_rejected_but_routed() {
        let server = make_server();
        for uri in ["/", "/ws"] {
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let resp = server.router().oneshot(req).await.unwrap();
            assert!(resp.status().is_client_error(), "{uri}: {}", resp.status());
            assert_ne!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_assigns_port_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("server task should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn listen_on_taken_port_is_bind_error() {
        let first = make_server();
        let (addr, _handle) = first.listen().await.unwrap();

        let second = RelayServer::new(ServerConfig {
            port: addr.port(),
            ..ServerConfig::default()
        });
        match second.listen().await {
            Err(RelayError::Bind { addr: bound, .. }) => {
                assert_eq!(bound, format!("127.0.0.1:{}", addr.port()));
            }
            other => panic!("expected bind error, got {other:?}"),
        }
        first.shutdown().shutdown();
    }
}
