//! Status Monitor - Main Entry Point

use anyhow::{Context, Result};
use api::{telemetry, App, Settings};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    telemetry::init_tracing(settings.logging.json);

    info!("=== Status Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let prometheus = match telemetry::install_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics exporter unavailable: {:#}", e);
            None
        }
    };

    let mut app = App::build(&settings, prometheus).await?;
    app.services.start();
    let router = app.router();

    let listener = tokio::net::TcpListener::bind(&settings.server.address)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.address))?;
    info!(address = %settings.server.address, "Starting API server");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await?;

    app.services.shutdown().await;
    info!("Status monitor stopped");
    Ok(())
}
