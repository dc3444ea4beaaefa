mod errors;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::build::{BuildTrigger, StatusStore};

pub use errors::AppError;

/// Shared application state accessible by all handlers.
pub struct AppState {
    pub store: Arc<StatusStore>,
    pub trigger: Arc<BuildTrigger>,
}

impl AppState {
    pub fn new(trigger: Arc<BuildTrigger>) -> Self {
        Self {
            store: trigger.store().clone(),
            trigger,
        }
    }
}

/// All routes, without the network listener.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/build/status", get(handlers::build_status))
        .route("/api/build/trigger", post(handlers::trigger_build))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the REST API server. A running build is allowed to finish on shutdown.
pub async fn serve(host: &str, port: u16, state: Arc<AppState>) -> Result<()> {
    let trigger = state.trigger.clone();
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!(builds_enabled = trigger.is_enabled(), "buildhook API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    trigger.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
