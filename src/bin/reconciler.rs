use classify_jobs::{app_state::AppState, config::AppConfig, shutdown};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Standalone status queue consumer, for deployments that scale the
/// reconciler separately from the API (`RUN_RECONCILER=false` on the API).
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting status reconciler");

    let config = AppConfig::from_env()?;
    let state = AppState::connect(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown::forward_signal(shutdown_tx));

    tracing::info!("Reconciler ready, consuming status queue");
    state.reconciler().run(shutdown_rx).await;

    tracing::info!("Reconciler exited");
    Ok(())
}
