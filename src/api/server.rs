use std::net::SocketAddr;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{info, warn};

use super::{
    services::{cancel_job, get_job, health, stream_events, submit_job},
    state::AppState,
};
use crate::config::Config;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/{job_id}", get(get_job).delete(cancel_job))
        .route("/events", get(stream_events))
        .route("/health", get(health))
        .with_state(state)
        // Transparently decompress gzip request bodies
        .layer(RequestDecompressionLayer::new())
}

/// Start the hub, the worker pool and the HTTP listener; run until a
/// shutdown signal arrives.
pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);
    let state = AppState::start(config).map_err(|e| format!("Failed to start download queue: {e}"))?;

    let app = build_router(state.clone());

    let listener = TcpListener::bind(address).await?;
    info!(%address, "mediabox API listening");

    let shutdown_state = state.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open event streams never end on their own
            shutdown_state.shutdown().await;
        })
        .await?;

    info!("mediabox API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
