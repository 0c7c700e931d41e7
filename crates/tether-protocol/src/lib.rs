//! # tether-protocol
//!
//! Wire protocol definitions for the Tether signaling relay.
//!
//! Peers exchange JSON envelopes over a WebSocket. The relay reads only the
//! routing fields and forwards the original text to the named target.
//!
//! ## Envelope Kinds
//!
//! - `register` - Bind the connection to a peer-chosen identity
//! - `activate` - Ask a device to start streaming
//! - `offer` / `answer` / `candidate` - Peer-connection negotiation
//! - anything else - Accepted and ignored
//!
//! ## Example
//!
//! ```rust
//! use tether_protocol::{codec, Envelope};
//!
//! let envelope = codec::decode(r#"{"kind":"activate","sender":"viewer-1","target":"device-9"}"#)
//!     .unwrap();
//! assert_eq!(envelope.target().map(|t| t.as_str()), Some("device-9"));
//! assert!(matches!(envelope, Envelope::Activate(_)));
//! ```

pub mod codec;
pub mod envelope;

pub use codec::{decode, EnvelopeCodec, ProtocolError, MAX_ENVELOPE_SIZE};
pub use envelope::{Envelope, Identity, Kind, Route};
