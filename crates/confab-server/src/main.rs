//! # Confab Server
//!
//! Room-based realtime messaging gateway.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (in-memory store)
//! confab
//!
//! # Run with a config file
//! CONFAB_CONFIG=/path/to/confab.toml confab
//!
//! # Run with environment overrides
//! CONFAB_PORT=8080 CONFAB_DATABASE__URL=mysql://user:pass@db/chat confab
//! ```

mod config;
mod db;
mod error;
mod handlers;
mod metrics;
mod session;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confab=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Confab server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
