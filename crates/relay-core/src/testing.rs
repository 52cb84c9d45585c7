//! In-memory connection for exercising the relay without a transport.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::connection::{ConnectionId, ConnectionState, Payload, PeerConnection, StateCell};
use crate::error::PeerSendError;

pub(crate) struct FakeConnection {
    id: ConnectionId,
    state: StateCell,
    received: Mutex<Vec<Payload>>,
    fail_with: Mutex<Option<PeerSendError>>,
    send_attempts: AtomicUsize,
}

impl FakeConnection {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: ConnectionId::from(id),
            state: StateCell::new(),
            received: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            send_attempts: AtomicUsize::new(0),
        }
    }

    pub(crate) fn received(&self) -> Vec<Payload> {
        self.received.lock().clone()
    }

    pub(crate) fn fail_sends_with(&self, err: PeerSendError) {
        *self.fail_with.lock() = Some(err);
    }

    pub(crate) fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::Relaxed)
    }
}

impl PeerConnection for FakeConnection {
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
        let _ = self.send_attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.fail_with.lock().clone() {
            return Err(err);
        }
        if !self.state.is_open() {
            return Err(PeerSendError::Closed);
        }
        self.received.lock().push(payload);
        Ok(())
    }

    fn close(&self) -> Result<(), PeerSendError> {
        let _ = self.state.close();
        Ok(())
    }
}
