//! Standalone mode: every collaborator served by one embedded store.

use std::net::SocketAddr;
use std::sync::Arc;

use arbor_core::EngineConfig;
use arbor_engine::{Collaborators, ControlPlane};
use arbor_state::StateStore;
use axum::Router;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::DaemonConfig;

/// Control plane and API router over `store`.
pub fn build_app(
    store: StateStore,
    engine: EngineConfig,
    shutdown: Option<watch::Receiver<bool>>,
) -> Router {
    let store = Arc::new(store.with_registry(&engine.registry));
    let plane = ControlPlane::new(engine, Collaborators::from_backend(store));
    arbor_api::build_router(plane, shutdown)
}

pub async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("arbor daemon starting in standalone mode");

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join("arbor.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    info!(
        domain = %config.engine.domain,
        bulk_concurrency = config.engine.bulk_concurrency,
        restart_concurrency = config.engine.restart_concurrency,
        "engine configured"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let router = build_app(store, config.engine, Some(shutdown_rx));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("arbor daemon stopped");
    Ok(())
}
