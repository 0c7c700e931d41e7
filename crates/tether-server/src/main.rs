//! # Tether Server
//!
//! WebRTC signaling relay.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (ws://0.0.0.0:5151/)
//! tether
//!
//! # Run with custom config
//! tether --config /path/to/tether.toml
//!
//! # Run with environment variables
//! TETHER_PORT=8080 TETHER_HOST=127.0.0.1 tether
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tether_server::{config::Config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(version, about = "WebRTC signaling relay")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long, env = "TETHER_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    tracing::info!("Starting Tether server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
