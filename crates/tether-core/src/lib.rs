//! # tether-core
//!
//! Connection registry and envelope routing for the Tether signaling relay.
//!
//! This crate provides the building blocks the server wires to its sockets:
//!
//! - **Registry** - Identity to connection table shared by all connections
//! - **Router** - Classifies envelopes and forwards them to their target
//! - **Session** - Per-connection lifecycle state
//! - **Peer** - Bounded outbound queue of a connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Session   │────▶│   Router    │────▶│ PeerHandle  │──▶ target socket
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │  Registry   │
//!                     └─────────────┘
//! ```

pub mod peer;
pub mod registry;
pub mod router;
pub mod session;

pub use peer::{ConnectionId, DeliveryError, Frame, PeerHandle};
pub use registry::Registry;
pub use router::{DropReason, Outcome, Router, RouterConfig, RouterStats};
pub use session::{Session, SessionState};
