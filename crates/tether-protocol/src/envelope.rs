//! Envelope types for the Tether signaling protocol.
//!
//! An envelope is a single JSON object exchanged between two peers through the relay.
//! The relay only reads the routing fields (`kind`, `sender`, `target`, `timestamp`);
//! everything else is payload that is forwarded untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;

use crate::codec::ProtocolError;

/// A peer-chosen identity.
///
/// Identities are opaque: the relay never validates their format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create a new identity.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Envelope kinds understood by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    Register,
    Activate,
    Offer,
    Answer,
    Candidate,
    Heartbeat,
    /// Any kind the relay does not route.
    Other(String),
}

impl Kind {
    /// Get the wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Kind::Register => "register",
            Kind::Activate => "activate",
            Kind::Offer => "offer",
            Kind::Answer => "answer",
            Kind::Candidate => "candidate",
            Kind::Heartbeat => "heartbeat",
            Kind::Other(kind) => kind,
        }
    }
}

impl From<&str> for Kind {
    fn from(value: &str) -> Self {
        match value {
            "register" => Kind::Register,
            "activate" => Kind::Activate,
            "offer" => Kind::Offer,
            "answer" => Kind::Answer,
            "candidate" => Kind::Candidate,
            "heartbeat" => Kind::Heartbeat,
            other => Kind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing fields of an envelope addressed to another peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Originator, as claimed by the sending peer.
    pub sender: Option<Identity>,
    /// Intended recipient.
    pub target: Identity,
    /// Optional sender-side timestamp.
    pub timestamp: Option<u64>,
}

/// A classified signaling envelope.
///
/// Routing is a single `match` over this enum, so every kind the relay knows
/// about is handled in exactly one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Bind the sending connection to `sender`.
    Register {
        sender: Identity,
        timestamp: Option<u64>,
    },
    /// Ask the target device to start streaming.
    Activate(Route),
    /// Session description offer.
    Offer(Route),
    /// Session description answer.
    Answer(Route),
    /// ICE candidate.
    Candidate(Route),
    /// Keepalive command. Never routed.
    Heartbeat { sender: Option<Identity> },
    /// A kind the relay does not know.
    Unrecognized { kind: String },
}

impl Envelope {
    /// Classify a decoded JSON object.
    ///
    /// The kind is taken from `kind`, then from `command` (when `type` is absent or
    /// `"command"`), then from `type`. A `register` envelope may name its identity
    /// with the legacy `id` field instead of `sender`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind is missing, or a field required by the kind is
    /// missing, empty, or not a string. Optional fields of the wrong type are
    /// treated as absent.
    pub fn from_object(object: &Map<String, Value>) -> Result<Self, ProtocolError> {
        let kind = Kind::from(resolve_kind(object)?);
        let timestamp = timestamp_field(object);

        let envelope = match &kind {
            Kind::Register => {
                let sender = match string_field(object, "sender")? {
                    Some(sender) => sender,
                    None => string_field(object, "id")?
                        .ok_or_else(|| ProtocolError::missing(&kind, "sender"))?,
                };
                Envelope::Register {
                    sender: Identity::from(sender),
                    timestamp,
                }
            }
            Kind::Activate | Kind::Offer | Kind::Answer | Kind::Candidate => {
                let target = string_field(object, "target")?
                    .ok_or_else(|| ProtocolError::missing(&kind, "target"))?;
                let route = Route {
                    sender: optional_string(object, "sender").map(Identity::from),
                    target: Identity::from(target),
                    timestamp,
                };
                match &kind {
                    Kind::Activate => Envelope::Activate(route),
                    Kind::Offer => Envelope::Offer(route),
                    Kind::Answer => Envelope::Answer(route),
                    _ => Envelope::Candidate(route),
                }
            }
            Kind::Heartbeat => Envelope::Heartbeat {
                sender: optional_string(object, "sender").map(Identity::from),
            },
            Kind::Other(other) => Envelope::Unrecognized {
                kind: other.clone(),
            },
        };

        Ok(envelope)
    }

    /// Get the envelope kind.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Envelope::Register { .. } => Kind::Register,
            Envelope::Activate(_) => Kind::Activate,
            Envelope::Offer(_) => Kind::Offer,
            Envelope::Answer(_) => Kind::Answer,
            Envelope::Candidate(_) => Kind::Candidate,
            Envelope::Heartbeat { .. } => Kind::Heartbeat,
            Envelope::Unrecognized { kind } => Kind::Other(kind.clone()),
        }
    }

    /// Get the claimed sender, if any.
    #[must_use]
    pub fn sender(&self) -> Option<&Identity> {
        match self {
            Envelope::Register { sender, .. } => Some(sender),
            Envelope::Activate(route)
            | Envelope::Offer(route)
            | Envelope::Answer(route)
            | Envelope::Candidate(route) => route.sender.as_ref(),
            Envelope::Heartbeat { sender } => sender.as_ref(),
            Envelope::Unrecognized { .. } => None,
        }
    }

    /// Get the recipient for envelopes that are routed to a peer.
    #[must_use]
    pub fn target(&self) -> Option<&Identity> {
        self.route().map(|route| &route.target)
    }

    /// Get the routing fields for envelopes that are routed to a peer.
    #[must_use]
    pub fn route(&self) -> Option<&Route> {
        match self {
            Envelope::Activate(route)
            | Envelope::Offer(route)
            | Envelope::Answer(route)
            | Envelope::Candidate(route) => Some(route),
            _ => None,
        }
    }
}

fn resolve_kind(object: &Map<String, Value>) -> Result<&str, ProtocolError> {
    if let Some(kind) = string_field(object, "kind")? {
        return Ok(kind);
    }

    let ty = string_field(object, "type")?;
    let command = string_field(object, "command")?;
    match (ty, command) {
        (None | Some("command"), Some(command)) => Ok(command),
        (Some(ty), _) => Ok(ty),
        (None, None) => Err(ProtocolError::MissingKind),
    }
}

/// Read an optional string field. Empty strings and `null` count as absent.
fn string_field<'a>(
    object: &'a Map<String, Value>,
    name: &'static str,
) -> Result<Option<&'a str>, ProtocolError> {
    match object.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ProtocolError::InvalidField(name)),
    }
}

/// Read a string field the kind does not require; any other JSON type is ignored.
fn optional_string<'a>(object: &'a Map<String, Value>, name: &'static str) -> Option<&'a str> {
    string_field(object, name).ok().flatten()
}

fn timestamp_field(object: &Map<String, Value>) -> Option<u64> {
    object.get("timestamp").and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(value: Value) -> Result<Envelope, ProtocolError> {
        match value {
            Value::Object(object) => Envelope::from_object(&object),
            _ => Err(ProtocolError::NotAnObject),
        }
    }

    #[test]
    fn test_register_envelope() {
        let envelope = classify(json!({
            "kind": "register",
            "sender": "viewer-1",
            "timestamp": 1700000000000u64
        }))
        .unwrap();

        assert_eq!(
            envelope,
            Envelope::Register {
                sender: Identity::from("viewer-1"),
                timestamp: Some(1_700_000_000_000),
            }
        );
        assert!(envelope.target().is_none());
    }

    #[test]
    fn test_register_requires_sender() {
        let err = classify(json!({"kind": "register"})).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField { field: "sender", .. }));

        let err = classify(json!({"kind": "register", "sender": ""})).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField { field: "sender", .. }));
    }

    #[test]
    fn test_routed_kinds_require_target() {
        for kind in ["activate", "offer", "answer", "candidate"] {
            let err = classify(json!({"kind": kind, "sender": "viewer-1"})).unwrap_err();
            assert!(
                matches!(err, ProtocolError::MissingField { field: "target", .. }),
                "{kind} should require a target"
            );
        }
    }

    #[test]
    fn test_offer_route() {
        let envelope = classify(json!({
            "kind": "offer",
            "sender": "viewer-1",
            "target": "device-9",
            "sdp": {"type": "offer", "sdp": "v=0"}
        }))
        .unwrap();

        assert_eq!(envelope.kind(), Kind::Offer);
        assert_eq!(envelope.sender().map(Identity::as_str), Some("viewer-1"));
        assert_eq!(envelope.target().map(Identity::as_str), Some("device-9"));
    }

    #[test]
    fn test_legacy_dialects() {
        // Browser client: type=command with a command sub-kind
        let envelope = classify(json!({
            "type": "command",
            "command": "register",
            "sender": "viewer-1"
        }))
        .unwrap();
        assert_eq!(envelope.kind(), Kind::Register);

        // Original registration used `id`
        let envelope = classify(json!({"type": "register", "id": "device-9"})).unwrap();
        assert_eq!(envelope.sender().map(Identity::as_str), Some("device-9"));

        // Bare command field
        let envelope = classify(json!({"command": "activate", "target": "device-9"})).unwrap();
        assert_eq!(envelope.kind(), Kind::Activate);

        // Handshake messages keyed by type
        let envelope = classify(json!({"type": "candidate", "target": "viewer-1"})).unwrap();
        assert_eq!(envelope.kind(), Kind::Candidate);
    }

    #[test]
    fn test_kind_field_takes_precedence() {
        let envelope = classify(json!({
            "kind": "answer",
            "type": "offer",
            "target": "viewer-1"
        }))
        .unwrap();
        assert_eq!(envelope.kind(), Kind::Answer);
    }

    #[test]
    fn test_unrecognized_and_heartbeat() {
        let envelope = classify(json!({"kind": "deactivate", "target": "device-9"})).unwrap();
        assert_eq!(
            envelope,
            Envelope::Unrecognized {
                kind: "deactivate".to_string()
            }
        );
        assert!(envelope.target().is_none());

        let envelope =
            classify(json!({"type": "command", "command": "heartbeat", "sender": "d"})).unwrap();
        assert_eq!(envelope.kind(), Kind::Heartbeat);
        assert!(envelope.route().is_none());
    }

    #[test]
    fn test_invalid_fields() {
        assert!(matches!(
            classify(json!({"sender": "viewer-1"})),
            Err(ProtocolError::MissingKind)
        ));
        assert!(matches!(
            classify(json!({"kind": "offer", "target": 42})),
            Err(ProtocolError::InvalidField("target"))
        ));
        assert!(matches!(
            classify(json!({"kind": "register", "sender": 7})),
            Err(ProtocolError::InvalidField("sender"))
        ));
    }

    #[test]
    fn test_optional_fields_of_wrong_type_are_ignored() {
        let cases = [
            json!({"kind": "offer", "sender": "viewer-1", "target": "device-9", "timestamp": 1700000000000.5}),
            json!({"kind": "offer", "target": "device-9", "timestamp": "now"}),
            json!({"kind": "answer", "target": "device-9", "timestamp": -5}),
            json!({"kind": "offer", "sender": 42, "target": "device-9"}),
            json!({"kind": "activate", "sender": {"id": "viewer-1"}, "target": "device-9"}),
        ];

        for value in cases {
            let envelope = classify(value.clone()).unwrap();
            let route = envelope.route().unwrap();
            assert_eq!(route.target.as_str(), "device-9", "{value}");
            assert_eq!(route.timestamp, None, "{value}");
        }

        let envelope = classify(json!({"kind": "candidate", "sender": 42, "target": "device-9"})).unwrap();
        assert!(envelope.sender().is_none());

        let envelope = classify(json!({"kind": "register", "sender": "device-9", "timestamp": "x"})).unwrap();
        assert_eq!(
            envelope,
            Envelope::Register {
                sender: Identity::from("device-9"),
                timestamp: None,
            }
        );
    }

    #[test]
    fn test_identity_borrow() {
        let identity = Identity::new("device-9");
        let s: &str = identity.borrow();
        assert_eq!(s, "device-9");
        assert_eq!(identity.to_string(), "device-9");
    }
}
