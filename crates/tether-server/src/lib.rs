//! # tether-server
//!
//! WebSocket front end for the Tether signaling relay: configuration, the
//! per-connection read/write loops, and Prometheus metrics.

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{run_server, serve, AppState};
