//! WebSocket client connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::{ConnectionId, ConnectionState, Payload, PeerConnection, PeerSendError, StateCell};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A connected WebSocket client as seen by the relay.
///
/// Sends go into a bounded queue drained by the connection's writer task;
/// closing cancels the connection's token, which stops its reader, writer and
/// heartbeat.
pub struct WsConnection {
    id: ConnectionId,
    state: StateCell,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Payload>,
    cancel: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last heartbeat check.
    pub is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full or closed queue.
    pub dropped_messages: AtomicU64,
}

impl WsConnection {
    /// Create a new connection in the `Connecting` state.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Payload>, cancel: CancellationToken) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: StateCell::new(),
            tx,
            cancel,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Token cancelled when this connection is closed.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or inbound frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl PeerConnection for WsConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn mark_open(&self) -> bool {
        self.state.open()
    }

    fn send(&self, payload: Payload) -> Result<(), PeerSendError> {
        if !self.state.is_open() {
            return Err(PeerSendError::Closed);
        }
        match self.tx.try_send(payload) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(PeerSendError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(PeerSendError::Closed)
            }
        }
    }

    fn close(&self) -> Result<(), PeerSendError> {
        let _ = self.state.close();
        self.cancel.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (WsConnection, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = WsConnection::new(ConnectionId::from("conn_1"), tx, CancellationToken::new());
        (conn, rx)
    }

    fn open_connection(capacity: usize) -> (WsConnection, mpsc::Receiver<Payload>) {
        let (conn, rx) = make_connection(capacity);
        assert!(conn.mark_open());
        (conn, rx)
    }

    #[test]
    fn new_connection_is_connecting() {
        let (conn, _rx) = make_connection(4);
        assert_eq!(conn.id().as_str(), "conn_1");
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.is_alive.load(Ordering::Relaxed));
    }

    #[test]
    fn send_before_open_is_refused() {
        let (conn, _rx) = make_connection(4);
        assert_eq!(conn.send(Payload::from("x")), Err(PeerSendError::Closed));
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = open_connection(4);
        conn.send(Payload::from("hello")).unwrap();
        assert_eq!(rx.recv().await.unwrap(), Payload::from("hello"));
    }

    #[tokio::test]
    async fn send_to_full_queue_reports_queue_full() {
        let (conn, _rx) = open_connection(1);
        conn.send(Payload::from("msg1")).unwrap();
        assert_eq!(conn.send(Payload::from("msg2")), Err(PeerSendError::QueueFull));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_after_writer_gone_reports_closed() {
        let (conn, rx) = open_connection(4);
        drop(rx);
        assert_eq!(conn.send(Payload::from("hello")), Err(PeerSendError::Closed));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn close_cancels_token_and_is_idempotent() {
        let (conn, _rx) = open_connection(4);
        conn.close().unwrap();
        conn.close().unwrap();
        assert!(conn.cancel_token().is_cancelled());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.send(Payload::from("late")), Err(PeerSendError::Closed));
    }

    #[test]
    fn closed_connection_cannot_reopen() {
        let (conn, _rx) = open_connection(4);
        conn.close().unwrap();
        assert!(!conn.mark_open());
    }

    #[test]
    fn mark_alive_and_check() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn last_pong_resets_on_mark_alive() {
        let (conn, _rx) = make_connection(4);
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.last_pong_elapsed() >= Duration::from_millis(10));
        conn.mark_alive();
        assert!(conn.last_pong_elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = make_connection(4);
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.age() > age1);
    }

    #[tokio::test]
    async fn queued_payloads_keep_order() {
        let (conn, mut rx) = open_connection(8);
        for i in 0..5 {
            conn.send(Payload::from(format!("msg_{i}"))).unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap(), Payload::from(format!("msg_{i}")));
        }
    }
}
