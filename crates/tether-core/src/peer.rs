//! Outbound handles to connected peers.
//!
//! Every accepted connection owns a bounded outbox drained by its writer task.
//! A [`PeerHandle`] is the sending half of that outbox; the registry stores
//! handles, never sockets.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// A text frame queued for delivery. Shared so forwarding never copies the payload twice.
pub type Frame = Arc<str>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// Why a frame could not be handed to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The outbox is at capacity.
    #[error("Outbox full")]
    Full,

    /// The writer task has gone away.
    #[error("Connection closed")]
    Closed,
}

/// Sending half of a connection's outbox.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: ConnectionId,
    outbox: mpsc::Sender<Frame>,
}

impl PeerHandle {
    /// Wrap an existing outbox sender.
    #[must_use]
    pub fn new(outbox: mpsc::Sender<Frame>) -> Self {
        Self {
            id: ConnectionId::generate(),
            outbox,
        }
    }

    /// Create a handle together with the receiving end of its outbox.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the outbox is full or the connection is gone. The frame
    /// is dropped in both cases.
    pub fn try_deliver(&self, frame: Frame) -> Result<(), DeliveryError> {
        self.outbox.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
