//! Per-connection task: registers the socket with the relay, relays every
//! inbound frame, and unregisters on close or error.
//!
//! Each connection runs three pieces:
//! - the reader (this task), which hands text/binary frames to
//!   [`Relay::on_message`] one at a time, so a sender's messages are relayed
//!   in the order it sent them;
//! - a writer task draining the connection's outbound queue into the socket
//!   and sending heartbeat pings;
//! - an optional heartbeat watcher that drops the connection when pongs stop.
//!
//! All three stop when the connection's cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use relay_core::{ConnectionId, Payload, PeerConnection, Relay};
use tokio::sync::mpsc;
use tokio::time::{self, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::connection::WsConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;

/// Upper bound on a single socket write. A peer that stalls longer is dropped.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the closing handshake once a connection is shutting down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// How a connection's reader loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// Close frame or end of stream from the peer.
    Closed,
    /// The connection was closed locally (relay, heartbeat, writer or shutdown).
    Cancelled,
    /// Reading from the socket failed.
    Error(String),
}

/// Drive one upgraded WebSocket until it closes.
#[instrument(skip_all, fields(conn_id))]
pub async fn handle_socket(
    socket: WebSocket,
    relay: Arc<Relay>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let (tx, rx) = mpsc::channel(config.send_queue_capacity.max(1));
    let cancel = shutdown.child_token();
    let connection = Arc::new(WsConnection::new(ConnectionId::new(), tx, cancel.clone()));
    let conn_id = connection.id().clone();
    let _ = tracing::Span::current().record("conn_id", conn_id.as_str());

    if !relay.on_connect(connection.clone()) {
        return;
    }

    let (ws_tx, ws_rx) = socket.split();

    let ping_interval = config.heartbeat_interval();
    let writer = tokio::spawn(run_writer(ws_tx, rx, cancel.clone(), ping_interval));

    let heartbeat = ping_interval.map(|interval| {
        let connection = connection.clone();
        let relay = relay.clone();
        let cancel = cancel.clone();
        let timeout = config.heartbeat_timeout();
        tokio::spawn(async move {
            if run_heartbeat(connection.clone(), interval, timeout, cancel).await
                == HeartbeatResult::TimedOut
            {
                relay.on_error(connection.id(), &heartbeat_timeout_reason(&connection));
            }
        })
    });

    let outcome = read_frames(ws_rx, &connection, &relay, &cancel).await;
    match &outcome {
        Disconnect::Closed | Disconnect::Cancelled => relay.on_close(&conn_id),
        Disconnect::Error(e) => relay.on_error(&conn_id, e),
    }
    debug!(?outcome, dropped = connection.drop_count(), age_ms = connection.age().as_millis(), "connection finished");

    // Unregistering closed the connection; make sure every task sees it.
    cancel.cancel();
    if let Some(heartbeat) = heartbeat {
        heartbeat.abort();
    }
    let _ = writer.await;
}

/// Relay inbound frames until the peer goes away or the connection is
/// cancelled.
async fn read_frames(
    mut ws_rx: SplitStream<WebSocket>,
    connection: &WsConnection,
    relay: &Relay,
    cancel: &CancellationToken,
) -> Disconnect {
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => return Disconnect::Cancelled,
            frame = ws_rx.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                connection.mark_alive();
                let _ = relay.on_message(connection.id(), Payload::Text(Bytes::from(text)));
            }
            Some(Ok(Message::Binary(data))) => {
                connection.mark_alive();
                let _ = relay.on_message(connection.id(), Payload::Binary(data));
            }
            // axum answers pings itself; both directions count as liveness.
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => connection.mark_alive(),
            Some(Ok(Message::Close(_))) | None => return Disconnect::Closed,
            Some(Err(e)) => return Disconnect::Error(e.to_string()),
        }
    }
}

/// Drain the outbound queue into the socket, pinging on `ping_interval`.
///
/// Any write failure or timeout cancels the connection, which ends the reader
/// and unregisters the peer.
async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Payload>,
    cancel: CancellationToken,
    ping_interval: Option<Duration>,
) {
    let mut pings = ping_interval.map(|every| {
        let mut interval = time::interval(every);
        interval.reset();
        interval
    });

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            payload = rx.recv() => match payload {
                Some(payload) => match to_message(payload) {
                    Some(frame) => frame,
                    None => continue,
                },
                None => break,
            },
            () = next_ping(&mut pings) => Message::Ping(Bytes::new()),
        };
        let write = tokio::select! {
            () = cancel.cancelled() => break,
            write = time::timeout(WRITE_TIMEOUT, ws_tx.send(frame)) => write,
        };
        match write {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "socket write failed");
                break;
            }
            Err(_) => {
                warn!(timeout_secs = WRITE_TIMEOUT.as_secs(), "socket write timed out");
                break;
            }
        }
    }

    cancel.cancel();
    let farewell = async {
        ws_tx.send(Message::Close(None)).await?;
        ws_tx.close().await
    };
    if time::timeout(CLOSE_TIMEOUT, farewell).await.is_err() {
        debug!(timeout_ms = CLOSE_TIMEOUT.as_millis(), "close handshake abandoned");
    }
}

async fn next_ping(pings: &mut Option<Interval>) {
    match pings {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Convert a payload into a frame without copying its buffer.
fn to_message(payload: Payload) -> Option<Message> {
    match payload {
        Payload::Text(data) => match Utf8Bytes::try_from(data) {
            Ok(text) => Some(Message::Text(text)),
            Err(e) => {
                warn!(error = %e, "dropping text payload that is not UTF-8");
                None
            }
        },
        Payload::Binary(data) => Some(Message::Binary(data)),
    }
}

fn heartbeat_timeout_reason(connection: &WsConnection) -> String {
    format!(
        "heartbeat timed out, no pong for {}s",
        connection.last_pong_elapsed().as_secs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_becomes_text_frame() {
        match to_message(Payload::from("abort")) {
            Some(Message::Text(text)) => assert_eq!(text.as_str(), "abort"),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn text_frame_reuses_payload_buffer() {
        let payload = Payload::text("orbit,100000");
        let origin = payload.as_bytes().as_ptr();
        match to_message(payload) {
            Some(Message::Text(text)) => assert_eq!(text.as_str().as_ptr(), origin),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn invalid_text_payload_is_dropped() {
        assert!(to_message(Payload::Text(Bytes::from_static(&[0xff, 0xfe]))).is_none());
    }

    #[test]
    fn binary_payload_becomes_binary_frame() {
        match to_message(Payload::binary(vec![1u8, 2, 3])) {
            Some(Message::Binary(data)) => assert_eq!(&data[..], &[1, 2, 3]),
            other => panic!("expected binary frame, got {other:?}"),
        }
    }

    #[test]
    fn heartbeat_reason_reports_silence() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = WsConnection::new(ConnectionId::from("quiet"), tx, CancellationToken::new());
        assert_eq!(
            heartbeat_timeout_reason(&conn),
            "heartbeat timed out, no pong for 0s"
        );
    }

    #[tokio::test]
    async fn disabled_ping_never_fires() {
        let mut pings: Option<Interval> = None;
        let fired = time::timeout(Duration::from_millis(20), next_ping(&mut pings)).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn enabled_ping_fires_after_interval() {
        let mut pings = Some({
            let mut i = time::interval(Duration::from_millis(10));
            i.reset();
            i
        });
        let fired = time::timeout(Duration::from_millis(200), next_ping(&mut pings)).await;
        assert!(fired.is_ok());
    }
}
