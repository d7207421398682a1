use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState};
use super::job_queue::HttpJobQueue;
use super::store::{StatusStore, spawn_sweeper};
use crate::config::AnalyzerConfig;

/// Build the full application router.
pub fn build_router(state: Arc<AppState>, cors_permissive: bool) -> Router {
    let mut app = api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if cors_permissive {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Start the analysis service and block until Ctrl+C.
pub async fn start_server(config: AnalyzerConfig) -> Result<()> {
    let job_queue = HttpJobQueue::new(&config.job_queue)?;
    let store = StatusStore::new(config.status_store.terminal_ttl());

    let sweeper = store
        .terminal_ttl()
        .map(|_| spawn_sweeper(store.clone(), config.status_store.sweep_interval()));

    let state = Arc::new(AppState {
        job_queue: Arc::new(job_queue),
        store,
        queue_config: config.job_queue.clone(),
        secrets: config.secrets.clone(),
    });

    let app = build_router(state, config.server.cors_permissive);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        %local_addr,
        job_queue = %config.job_queue.job_queue,
        endpoint = %config.job_queue.endpoint,
        "repo-analyzer listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
