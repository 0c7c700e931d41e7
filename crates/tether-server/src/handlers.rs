//! Connection handlers for the Tether server.
//!
//! This module handles the connection lifecycle and envelope processing.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tether_core::{DropReason, Outcome, PeerHandle, Router as EnvelopeRouter, RouterConfig, Session};
use tether_protocol::codec;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The envelope router.
    pub router: EnvelopeRouter,
    /// Server configuration.
    pub config: Config,
    /// Number of open WebSocket connections.
    connections: AtomicUsize,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let router_config = RouterConfig {
            max_envelope_size: config.limits.max_message_size,
        };

        Self {
            router: EnvelopeRouter::with_config(router_config),
            config,
            connections: AtomicUsize::new(0),
        }
    }

    /// Get the number of open WebSocket connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }
}

/// Holds one of the `max_connections` slots; released on drop.
struct ConnectionSlot(Arc<AppState>);

impl ConnectionSlot {
    /// Claim a slot, or `None` when the server is full.
    fn try_acquire(state: &Arc<AppState>) -> Option<Self> {
        let limit = state.config.limits.max_connections;
        state
            .connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < limit).then_some(open + 1)
            })
            .ok()?;
        Some(Self(Arc::clone(state)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    serve(listener, config, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve<F>(listener: TcpListener, config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let state = Arc::new(AppState::new(config));
    let path = state.config.transport.websocket_path.clone();

    info!("Tether server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, path);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Tether server stopped");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.connection_count(),
        "registered": state.router.stats().registered,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    // The slot moves into the upgrade callback; a failed upgrade drops it
    let Some(slot) = ConnectionSlot::try_acquire(&state) else {
        warn!(
            limit = state.config.limits.max_connections,
            "Connection limit reached, rejecting upgrade"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    ws.on_upgrade(move |socket| handle_websocket(socket, state, slot))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, _slot: ConnectionSlot) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (peer, mut outbox) = PeerHandle::channel(state.config.limits.outbox_capacity);
    let mut session = Session::accept(peer);
    let connection_id = session.id();

    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // Writer: drain the outbox into the socket
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            metrics::record_message(frame.len(), "outbound");
            if sender.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!(connection = %connection_id, "Writer stopped");
                break;
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, &mut session, &text);
                    }
                    Some(Ok(Message::Binary(data))) => match codec::text_from_binary(data) {
                        Ok(text) => handle_text(&state, &mut session, &text),
                        Err(e) => {
                            warn!(connection = %connection_id, error = %e, "Discarding binary message");
                            metrics::record_dropped("malformed");
                        }
                    },
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Pings are answered by the socket layer
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: release the identity if this connection still holds it
    let identity = state.router.close(&mut session);
    writer.abort();
    metrics::set_registered(state.router.stats().registered);

    match identity {
        Some(identity) => {
            info!(connection = %connection_id, identity = %identity, "Client disconnected");
        }
        None => debug!(connection = %connection_id, "WebSocket disconnected"),
    }
}

/// Dispatch one inbound envelope and record what happened to it.
fn handle_text(state: &AppState, session: &mut Session, text: &str) {
    let start = Instant::now();
    metrics::record_message(text.len(), "inbound");

    let outcome = state.router.dispatch(session, text);
    metrics::record_outcome(&outcome);

    match &outcome {
        Outcome::Registered {
            identity,
            displaced,
        } => {
            info!(connection = %session.id(), identity = %identity, "Registered client");
            if let Some(old) = displaced {
                info!(
                    identity = %identity,
                    displaced = %old,
                    "Identity taken over by a newer connection"
                );
            }
            metrics::set_registered(state.router.stats().registered);
        }
        Outcome::Forwarded { kind, target } => {
            debug!(connection = %session.id(), kind = %kind, target = %target, "Forwarded");
        }
        Outcome::Dropped(DropReason::Malformed(e)) => {
            warn!(connection = %session.id(), error = %e, "Invalid envelope");
        }
        Outcome::Dropped(reason) => {
            debug!(connection = %session.id(), reason = reason.label(), "Dropped");
        }
    }

    metrics::record_latency(start.elapsed().as_secs_f64());
}
