//! sidegate - HTTP gateway running IPFS-hosted scripts in a remote sandbox.
//!
//! Script code is fetched through a layered cache; per-script secrets come
//! from a token-gated vault.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sidegate_gateway::{router, AppState, GatewayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::parse();

    // Setup logging; RUST_LOG overrides the verbosity flag
    let default_level = if config.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let state = AppState::from_config(&config).context("Failed to initialize gateway")?;
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!(listen = %config.listen, adapters = %config.code_adapters, "sidegate listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
