//! Connection registry for Tether.
//!
//! The registry is the single source of truth for who is reachable and how:
//! a map from identity to the outbox of the connection currently bound to it.

use crate::peer::{ConnectionId, PeerHandle};
use dashmap::DashMap;
use tether_protocol::Identity;
use tracing::{debug, trace};

/// Identity to connection table shared by every connection task.
///
/// Each identity maps to at most one connection. Binding an identity that is
/// already taken silently replaces the old connection.
#[derive(Debug, Default)]
pub struct Registry {
    peers: DashMap<Identity, PeerHandle>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an identity to a connection.
    ///
    /// Returns the ID of the connection that previously held the identity, if it
    /// was a different one. The displaced connection is not notified.
    pub fn bind(&self, identity: Identity, peer: PeerHandle) -> Option<ConnectionId> {
        let connection = peer.id();
        let previous = self.peers.insert(identity.clone(), peer);
        let displaced = previous.map(|p| p.id()).filter(|id| *id != connection);

        match displaced {
            Some(old) => debug!(
                identity = %identity,
                connection = %connection,
                displaced = %old,
                "Identity rebound"
            ),
            None => debug!(identity = %identity, connection = %connection, "Identity bound"),
        }

        displaced
    }

    /// Look up the connection currently bound to an identity.
    ///
    /// The handle is cloned so no lock is held while the caller sends.
    #[must_use]
    pub fn lookup(&self, identity: &str) -> Option<PeerHandle> {
        let peer = self.peers.get(identity).map(|entry| entry.value().clone());
        trace!(identity = %identity, found = peer.is_some(), "Lookup");
        peer
    }

    /// Remove an identity, but only while it is still bound to `connection`.
    ///
    /// Returns `true` if the entry was removed. A newer binding made by another
    /// connection is left in place.
    pub fn unbind(&self, identity: &str, connection: ConnectionId) -> bool {
        let removed = self
            .peers
            .remove_if(identity, |_, peer| peer.id() == connection)
            .is_some();

        if removed {
            debug!(identity = %identity, connection = %connection, "Identity unbound");
        } else {
            trace!(
                identity = %identity,
                connection = %connection,
                "Unbind skipped, identity not held by this connection"
            );
        }

        removed
    }

    /// Get the number of bound identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Check if no identity is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_bind_lookup() {
        let registry = Registry::new();
        let (peer, _rx) = PeerHandle::channel(8);

        assert!(registry.lookup("device-9").is_none());
        assert_eq!(registry.bind(Identity::from("device-9"), peer.clone()), None);

        let found = registry.lookup("device-9").unwrap();
        assert_eq!(found.id(), peer.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rebind_overwrites() {
        let registry = Registry::new();
        let (first, _rx1) = PeerHandle::channel(8);
        let (second, _rx2) = PeerHandle::channel(8);

        registry.bind(Identity::from("device-9"), first.clone());
        let displaced = registry.bind(Identity::from("device-9"), second.clone());

        assert_eq!(displaced, Some(first.id()));
        assert_eq!(registry.lookup("device-9").unwrap().id(), second.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rebind_same_connection_is_not_displacement() {
        let registry = Registry::new();
        let (peer, _rx) = PeerHandle::channel(8);

        registry.bind(Identity::from("viewer-1"), peer.clone());
        assert_eq!(registry.bind(Identity::from("viewer-1"), peer), None);
    }

    #[test]
    fn test_stale_unbind_keeps_newer_binding() {
        let registry = Registry::new();
        let (old, _rx1) = PeerHandle::channel(8);
        let (new, _rx2) = PeerHandle::channel(8);

        registry.bind(Identity::from("device-9"), old.clone());
        registry.bind(Identity::from("device-9"), new.clone());

        // The old connection closes late
        assert!(!registry.unbind("device-9", old.id()));
        assert_eq!(registry.lookup("device-9").unwrap().id(), new.id());

        assert!(registry.unbind("device-9", new.id()));
        assert!(registry.lookup("device-9").is_none());

        // Idempotent
        assert!(!registry.unbind("device-9", new.id()));
    }

    #[test]
    fn test_len() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        let (a, _rx1) = PeerHandle::channel(8);
        let (b, _rx2) = PeerHandle::channel(8);

        registry.bind(Identity::from("viewer-1"), a);
        registry.bind(Identity::from("device-9"), b);

        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_concurrent_bind_unbind() {
        let registry = Arc::new(Registry::new());
        let mut handles = Vec::new();

        for t in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for i in 0..200 {
                    let (peer, _rx) = PeerHandle::channel(1);
                    let identity = format!("peer-{}-{}", t, i % 10);
                    registry.bind(Identity::from(identity.as_str()), peer.clone());
                    let _ = registry.lookup(&identity);
                    registry.unbind(&identity, peer.id());
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(registry.is_empty());
    }
}
