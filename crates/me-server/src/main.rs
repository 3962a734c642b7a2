use std::sync::Arc;

use me_config::ServerConfig;
use me_server::metrics::Metrics;
use me_server::shutdown::{listen_for_signals, ShutdownCoordinator};
use me_server::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so nothing competes with protocol traffic elsewhere
    // in the deployment.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(ServerConfig::from_env()?);
    info!(
        "Starting wrapper for command '{}' on {}:{}",
        config.command, config.host, config.port
    );

    let metrics = Arc::new(Metrics::new()?);
    let shutdown = Arc::new(ShutdownCoordinator::new());
    listen_for_signals(shutdown.clone());

    let state = AppState::new(config, metrics, shutdown);
    me_server::start_server(state).await?;

    info!("Wrapper stopped");
    Ok(())
}
