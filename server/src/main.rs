use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use batchconv_server::config::{LogFormat, ServerConfig};
use batchconv_server::router::build_app_router;
use batchconv_server::state::AppState;

const DEFAULT_LOG_FILTER: &str = "batchconv=info,batchconv_server=info,tower_http=info";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;
    init_tracing(config.log_format)?;
    tracing::info!(host = %config.host, port = config.port, "Loaded server configuration");

    let service = config
        .load_service_config()
        .context("Failed to load service configuration")?;
    tracing::info!(
        archive_directory = %service.archive_directory,
        max_concurrent_jobs = ?service.max_concurrent_jobs,
        item_timeout_secs = ?service.item_timeout_secs,
        "Loaded service configuration"
    );

    let state = AppState::new(service);
    let coordinator = state.coordinator.clone();
    let app = build_app_router(state, &config);

    let addr = SocketAddr::new(
        config.host.parse().context("Invalid HOST address")?,
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!(%addr, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped accepting connections, cancelling jobs");
    if tokio::time::timeout(SHUTDOWN_GRACE, coordinator.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Job workers did not stop within {:?}", SHUTDOWN_GRACE);
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(
                registry.with(tracing_subscriber::fmt::layer().json()),
            )
        }
        LogFormat::Pretty => {
            tracing::subscriber::set_global_default(registry.with(tracing_subscriber::fmt::layer()))
        }
    }
    .context("Failed to install tracing subscriber")?;

    // the library logs job store and worker events through `log`
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
