use std::path::PathBuf;

use clap::Parser;

use prom_logger::Settings;
use prom_logger::api::create_router;
use prom_logger::observability::init_tracing;

#[derive(Parser)]
#[command(name = "prom-logger", about = "Demo server instrumented with Prometheus request metrics")]
struct Cli {
    /// Path to YAML settings file (defaults are used when omitted)
    #[arg(short, long, env = "PROM_LOGGER_CONFIG")]
    config: Option<PathBuf>,

    /// Override listen address
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    init_tracing(&settings.observability)?;

    let (registry, router) = create_router(settings.metrics.clone())?;

    let listen = cli.listen.unwrap_or_else(|| settings.http.listen.clone());
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(
        listen = %listen,
        metrics_path = ?registry.metrics_path(),
        "HTTP server starting"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
