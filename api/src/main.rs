use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

use api::routes;
use api::state::AppState;
use common::bootstrap;
use common::config::Settings;
use common::telemetry;
use common::Dispatcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Settings::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &config.observability.log_level,
        config.observability.tracing_endpoint.as_deref(),
    )?;
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Configuration loaded"
    );

    if let Some(metrics_port) = config.observability.metrics_port {
        telemetry::init_metrics(metrics_port)?;
    }

    let registry = bootstrap::init_registry(&config)?;
    let dispatcher = bootstrap::init_dispatcher(&config, registry);

    let state = AppState::new(Arc::clone(&dispatcher), config.clone());
    let app = routes::create_router(state);

    // Start server
    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .context("Invalid server host")?,
        config.server.port,
    ));
    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(dispatcher))
        .await?;

    tracing::info!("API server stopped");
    telemetry::shutdown_tracer();
    Ok(())
}

/// Graceful shutdown signal handler
///
/// Cancels every running migration so open event streams reach their
/// terminal event and close.
async fn shutdown_signal(dispatcher: Arc<Dispatcher>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    let cancelled = dispatcher.cancel_all();
    tracing::info!(cancelled, "Initiating graceful shutdown");
}
