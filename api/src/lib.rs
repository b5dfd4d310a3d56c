//! HTTP ingestion surface for the review pipeline.
//!
//! Two routes feed the engine:
//! - `POST /api/review/webhook/{provider}` — raw provider webhooks
//! - `POST /api/review/trigger` — secret-protected manual trigger
//!
//! Both normalize into a [`review_orchestrator::ReviewRequest`], spawn the
//! pipeline in a background task and answer immediately with the execution
//! id. The server shuts down gracefully on Ctrl+C and trips the shared
//! cancellation flag so in-flight executions stop at the next stage
//! boundary.

use std::{env, sync::Arc};

use axum::{Router, middleware, routing::post};
use review_orchestrator::CancelFlag;
use tokio::signal;
use tracing::info;

pub mod core;
pub mod error_handler;
pub mod middleware_layer;
mod routes;

use crate::core::app_state::AppState;
use crate::error_handler::{AppError, AppResult};
use crate::middleware_layer::json_extractor::json_error_mapper;
use crate::routes::review::{
    trigger_review_route::trigger_review_route, webhook_route::webhook_route,
};

pub async fn start() -> AppResult<()> {
    let host_url = env::var("API_ADDRESS").map_err(|_| AppError::MissingEnv("API_ADDRESS"))?;

    let state = Arc::new(AppState::from_env()?);
    let cancel = state.cancel.clone();

    let app = Router::new()
        .route("/api/review/webhook/{provider}", post(webhook_route))
        .route("/api/review/trigger", post(trigger_review_route))
        .layer(middleware::from_fn(json_error_mapper))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&host_url)
        .await
        .map_err(AppError::Bind)?;
    info!("api listening on {host_url}");

    // Start server with graceful shutdown on Ctrl+C
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .map_err(AppError::Server)?;

    Ok(())
}

/// Resolves when Ctrl+C is pressed; trips the shared cancellation flag so
/// spawned executions stop at their next stage boundary.
async fn shutdown_signal(cancel: CancelFlag) {
    signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    info!("shutdown signal received, cancelling in-flight executions");
    cancel.cancel();
}
