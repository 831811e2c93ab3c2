pub mod api;
pub mod booking; // Appointment core: conflicts, lifecycle, access ledger
pub mod config;
pub mod core_state; // Transport-agnostic state
pub mod credentials;
pub mod db;
pub mod events; // Real-time fan-out
pub mod models;
pub mod sessions;
pub mod webhook;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Core(#[from] core_state::CoreError),
    #[error(transparent)]
    Server(#[from] api::server::ServerError),
}

/// Start the backend and serve until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::from_env()?;
    tracing::info!(data_dir = %config.data_dir.display(), "Opening data directory");
    let bind_addr = config.bind_addr;
    let core = Arc::new(core_state::CoreState::new(config)?);

    let server = api::start_server(core, bind_addr).await?;
    tracing::info!(addr = %server.addr, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    server.stop().await;
    Ok(())
}
