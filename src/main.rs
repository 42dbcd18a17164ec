use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod services;
mod state;
mod types;
mod web;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onlinecare_chat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting OnlineCare chat relay");

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Upstream inference server: {}", config.upstream_base_url);
    tracing::info!("Model: {}", config.model_name);

    // Create application state
    let state = state::AppState::new(config)?;

    // Start web server
    web::start_server(state).await?;

    Ok(())
}
