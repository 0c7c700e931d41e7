//! Envelope router for Tether.
//!
//! The router classifies each inbound envelope and either updates the registry
//! (registration) or forwards the original text to the envelope's target.
//! Delivery is best effort: an offline or backed-up target simply misses the
//! envelope, and the sender is never told.

use crate::peer::{ConnectionId, DeliveryError, Frame};
use crate::registry::Registry;
use crate::session::Session;
use tether_protocol::{Envelope, EnvelopeCodec, Identity, Kind, ProtocolError, Route};
use tracing::{debug, info, trace};

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum accepted envelope size in bytes.
    pub max_envelope_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_envelope_size: tether_protocol::MAX_ENVELOPE_SIZE,
        }
    }
}

/// Why an envelope was not delivered.
#[derive(Debug)]
pub enum DropReason {
    /// Could not be decoded, or lacked a field its kind requires.
    Malformed(ProtocolError),
    /// No connection is bound to the target.
    TargetOffline { kind: Kind, target: Identity },
    /// The target's outbox is full or closing.
    TargetNotWritable {
        kind: Kind,
        target: Identity,
        error: DeliveryError,
    },
    /// The kind is not routed by the relay.
    Unrecognized(Kind),
    /// The session had already closed.
    SessionClosed,
}

impl DropReason {
    /// Short label for metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            DropReason::Malformed(_) => "malformed",
            DropReason::TargetOffline { .. } => "offline",
            DropReason::TargetNotWritable { .. } => "not_writable",
            DropReason::Unrecognized(_) => "unrecognized",
            DropReason::SessionClosed => "closed",
        }
    }
}

/// Result of dispatching one envelope.
#[derive(Debug)]
pub enum Outcome {
    /// The connection is now reachable at `identity`.
    Registered {
        identity: Identity,
        /// Connection that held the identity before, if any.
        displaced: Option<ConnectionId>,
    },
    /// The envelope was queued for the target.
    Forwarded { kind: Kind, target: Identity },
    /// The envelope was discarded.
    Dropped(DropReason),
}

impl Outcome {
    /// Label of the envelope kind, when the envelope could be classified.
    ///
    /// Client-chosen kinds the relay does not route all share the label `"other"`,
    /// so the set of labels is fixed.
    #[must_use]
    pub fn kind_label(&self) -> Option<&'static str> {
        match self {
            Outcome::Registered { .. } => Some("register"),
            Outcome::Forwarded { kind, .. }
            | Outcome::Dropped(DropReason::TargetOffline { kind, .. })
            | Outcome::Dropped(DropReason::TargetNotWritable { kind, .. })
            | Outcome::Dropped(DropReason::Unrecognized(kind)) => Some(kind_label(kind)),
            Outcome::Dropped(_) => None,
        }
    }
}

fn kind_label(kind: &Kind) -> &'static str {
    match kind {
        Kind::Register => "register",
        Kind::Activate => "activate",
        Kind::Offer => "offer",
        Kind::Answer => "answer",
        Kind::Candidate => "candidate",
        Kind::Heartbeat => "heartbeat",
        Kind::Other(_) => "other",
    }
}

/// The central envelope router.
///
/// One router is shared by all connection tasks. Per-connection state lives in
/// [`Session`]; the only shared state is the [`Registry`].
#[derive(Debug)]
pub struct Router {
    registry: Registry,
    codec: EnvelopeCodec,
}

impl Router {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            registry: Registry::new(),
            codec: EnvelopeCodec::with_max_size(config.max_envelope_size),
        }
    }

    /// Get the connection registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            registered: self.registry.len(),
        }
    }

    /// Dispatch one raw text envelope received on `session`.
    ///
    /// Never fails: every problem becomes [`Outcome::Dropped`].
    pub fn dispatch(&self, session: &mut Session, text: &str) -> Outcome {
        if session.is_closed() {
            return Outcome::Dropped(DropReason::SessionClosed);
        }

        let envelope = match self.codec.decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(connection = %session.id(), error = %e, "Discarding malformed envelope");
                return Outcome::Dropped(DropReason::Malformed(e));
            }
        };

        match envelope {
            Envelope::Register { sender, .. } => self.register(session, sender),
            Envelope::Activate(route) => self.forward(Kind::Activate, route, text),
            Envelope::Offer(route) => self.forward(Kind::Offer, route, text),
            Envelope::Answer(route) => self.forward(Kind::Answer, route, text),
            Envelope::Candidate(route) => self.forward(Kind::Candidate, route, text),
            Envelope::Heartbeat { .. } => {
                trace!(connection = %session.id(), "Heartbeat");
                Outcome::Dropped(DropReason::Unrecognized(Kind::Heartbeat))
            }
            Envelope::Unrecognized { kind } => {
                debug!(connection = %session.id(), kind = %kind, "Ignoring unrecognized envelope");
                Outcome::Dropped(DropReason::Unrecognized(Kind::Other(kind)))
            }
        }
    }

    /// Close a session and release its identity.
    ///
    /// The identity is only released while it still points at this connection.
    /// Returns the identity the session was registered under. Idempotent.
    pub fn close(&self, session: &mut Session) -> Option<Identity> {
        let identity = session.close()?;
        self.registry.unbind(identity.as_str(), session.id());
        Some(identity)
    }

    fn register(&self, session: &mut Session, identity: Identity) -> Outcome {
        // A connection is reachable under one identity at a time
        if let Some(previous) = session.identity() {
            if *previous != identity {
                self.registry.unbind(previous.as_str(), session.id());
            }
        }

        let displaced = self.registry.bind(identity.clone(), session.peer().clone());
        session.register(identity.clone());

        Outcome::Registered {
            identity,
            displaced,
        }
    }

    fn forward(&self, kind: Kind, route: Route, text: &str) -> Outcome {
        let Route { sender, target, .. } = route;

        let Some(peer) = self.registry.lookup(target.as_str()) else {
            debug!(kind = %kind, target = %target, "Target offline, dropping");
            return Outcome::Dropped(DropReason::TargetOffline { kind, target });
        };

        match peer.try_deliver(Frame::from(text)) {
            Ok(()) => {
                trace!(
                    kind = %kind,
                    sender = sender.as_ref().map(Identity::as_str).unwrap_or("-"),
                    target = %target,
                    connection = %peer.id(),
                    "Forwarded"
                );
                Outcome::Forwarded { kind, target }
            }
            Err(error) => {
                debug!(kind = %kind, target = %target, error = %error, "Target not writable, dropping");
                Outcome::Dropped(DropReason::TargetNotWritable {
                    kind,
                    target,
                    error,
                })
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Router statistics.
#[derive(Debug, Clone)]
pub struct RouterStats {
    /// Number of bound identities.
    pub registered: usize,
}
