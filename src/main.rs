use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use classify_jobs::{app_state::AppState, config::AppConfig, routes, shutdown, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env()?;

    tracing::info!("Initializing classify-jobs server");

    let prometheus_handle = Arc::new(PrometheusBuilder::new().install_recorder()?);
    telemetry::describe_metrics();

    let bind_addr = config.bind_addr.clone();
    let run_reconciler = config.run_reconciler;
    let state = AppState::connect(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown::forward_signal(shutdown_tx));

    let reconciler = if run_reconciler {
        tracing::info!("Starting embedded status reconciler");
        Some(tokio::spawn(state.reconciler().run(shutdown_rx.clone())))
    } else {
        None
    };

    let app = routes::api_router(state)
        .merge(routes::metrics_router(prometheus_handle))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    if let Some(reconciler) = reconciler {
        reconciler.await?;
    }

    tracing::info!("Server exited");
    Ok(())
}
