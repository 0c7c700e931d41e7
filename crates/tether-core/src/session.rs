//! Per-connection lifecycle.
//!
//! ```text
//! accept ──▶ Open ──register──▶ Registered(identity) ──close──▶ Closed
//!             │                  │    ▲                           ▲
//!             │                  └────┘ re-register               │
//!             └───────────────────────────────close───────────────┘
//! ```
//!
//! A session only exists once the transport has accepted the socket, so the
//! pre-accept state has no representation here. Errors never move a session;
//! only registration and close do.

use crate::peer::{ConnectionId, PeerHandle};
use tether_protocol::Identity;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, no identity yet.
    Open,
    /// Bound to an identity.
    Registered(Identity),
    /// Transport closed. Terminal.
    Closed,
}

/// State owned by one connection task.
#[derive(Debug)]
pub struct Session {
    peer: PeerHandle,
    state: SessionState,
}

impl Session {
    /// Start a session for a freshly accepted connection.
    #[must_use]
    pub fn accept(peer: PeerHandle) -> Self {
        Self {
            peer,
            state: SessionState::Open,
        }
    }

    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.peer.id()
    }

    /// Get the outbound handle for this connection.
    #[must_use]
    pub fn peer(&self) -> &PeerHandle {
        &self.peer
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Get the bound identity, if registered.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Registered(identity) => Some(identity),
            _ => None,
        }
    }

    /// Check if the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Move to `Registered`, returning the identity held before.
    ///
    /// Ignored once closed.
    pub(crate) fn register(&mut self, identity: Identity) -> Option<Identity> {
        if self.is_closed() {
            return None;
        }
        match std::mem::replace(&mut self.state, SessionState::Registered(identity)) {
            SessionState::Registered(previous) => Some(previous),
            _ => None,
        }
    }

    /// Move to `Closed`, returning the identity that was bound.
    ///
    /// Calling this again returns `None`.
    pub(crate) fn close(&mut self) -> Option<Identity> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Registered(identity) => Some(identity),
            _ => None,
        }
    }
}
