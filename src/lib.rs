pub mod api;
pub mod apps;
pub mod config;
pub mod context;
pub mod core_state;
pub mod pipeline;
pub mod retrieval;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::core_state::{CoreError, CoreState};

/// Startup failures reported by [`run`].
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Cannot initialise core state: {0}")]
    Core(#[from] CoreError),
    #[error("Cannot start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("{0}")]
    Server(String),
}

pub fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env();
    let bind_addr = config.bind_addr;

    // Blocking HTTP clients must be built outside the tokio runtime.
    let core = Arc::new(CoreState::from_config(config)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let server = api::start_server_on(core, bind_addr)
            .await
            .map_err(StartupError::Server)?;
        tracing::info!(addr = %server.session.server_addr, "Dashboard API listening");

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for ctrl-c, shutting down");
        }
        server.stop().await;
        Ok::<(), StartupError>(())
    })
}
