//! Air quality proxy: binary entrypoint.
//! Loads config, probes the side store, then serves the HTTP API while the
//! sync loop runs in the background.

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use air_quality_proxy::ingest::scheduler::{spawn_sync_scheduler, ShutdownOutcome};
use air_quality_proxy::store::SideStore;
use air_quality_proxy::telemetry::{init_tracing, Metrics};
use air_quality_proxy::{build_service, config, router};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = config::load_default().context("loading configuration")?;
    let store = SideStore::connect(&cfg.store).await?;
    let metrics = Metrics::init()?;

    let service = build_service(&cfg, store)?;
    let sync = service.scheduler.map(spawn_sync_scheduler);
    if sync.is_none() {
        tracing::info!(target: "sync", "sync loop disabled");
    }

    let app = router(service.state).merge(metrics.router());
    let listener = TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    tracing::info!(bind = %cfg.server.bind, "air quality proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    if let Some(handle) = sync {
        match handle.shutdown(cfg.shutdown_grace()).await {
            ShutdownOutcome::Stopped => tracing::info!(target: "sync", "sync loop stopped"),
            ShutdownOutcome::Abandoned => {
                tracing::warn!(target: "sync", "sync loop abandoned after grace period")
            }
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
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
