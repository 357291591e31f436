//! Derby Server
//!
//! Resource server for the garage, winners and engine endpoints

use anyhow::Result;
use derby_server::{api, config::ServerConfig, state};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    info!(
        "Starting Derby server (seeded: {}, breakdown chance: {})",
        config.seed, config.breakdown_chance
    );

    let state = state::AppState::new(config.backend());
    let app = api::create_router(state);

    info!("Server listening on http://{}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
