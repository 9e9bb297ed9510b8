//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::AppError;
use crate::server::handlers::{
    analyze_config_handler, chat_handler, checkpoint_status_handler, confirm_handler,
    deploy_remote_handler, download_config_handler, generate_config_handler, health_handler,
    history_handler, trigger_handler, troubleshoot_handler, validate_handler, version_handler,
    versions_handler,
};
use crate::server::state::ServerState;

/// Build the API router.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Configuration
        .route("/api/versions", get(versions_handler))
        .route("/api/validate-config", post(validate_handler))
        .route("/api/generate-config", post(generate_config_handler))
        .route("/api/download-config", post(download_config_handler))
        // Deployment
        .route("/api/deploy/remote", post(deploy_remote_handler))
        // Rollback
        .route("/api/rollback/confirm", post(confirm_handler))
        .route("/api/rollback/trigger", post(trigger_handler))
        .route("/api/rollback/history", get(history_handler))
        .route("/api/rollback/status/{id}", get(checkpoint_status_handler))
        // Assistant
        .route("/api/chat", post(chat_handler))
        .route("/api/analyze-config", post(analyze_config_handler))
        .route("/api/troubleshoot", post(troubleshoot_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), AppError>>, AppError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| AppError::ServerError(e.to_string()))
    });

    Ok(handle)
}
