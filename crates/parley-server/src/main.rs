//! # Parley Server
//!
//! Real-time messaging backend: conversation history, chats, channels,
//! presence, and WebSocket push of new messages.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (./data, port 3000)
//! parley
//!
//! # Run with a config file in the working directory
//! cp parley.toml.example parley.toml && parley
//!
//! # Run with environment variables
//! PARLEY_PORT=8080 PARLEY_HOST=0.0.0.0 PARLEY_STORAGE__DATA_DIR=/var/lib/parley parley
//! ```

mod config;
mod error;
mod handlers;
mod metrics;
mod socket;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,parley_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Parley server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
