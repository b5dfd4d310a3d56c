use std::sync::Arc;

use review_orchestrator::{CancelFlag, Orchestrator};
use tracing::warn;

use crate::error_handler::AppResult;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared secret protecting the ingestion routes. `None` disables the
    /// check (local runs only).
    pub webhook_secret: Option<String>,
    /// Long-lived pipeline driver, shared by every execution.
    pub orchestrator: Arc<Orchestrator>,
    /// Process-wide cancellation flag, tripped on shutdown.
    pub cancel: CancelFlag,
}

impl AppState {
    /// Load shared state from environment variables.
    ///
    /// `WEBHOOK_SECRET` guards both ingestion routes; the pipeline driver
    /// pulls its own LLM and retry configuration from the environment.
    pub fn from_env() -> AppResult<Self> {
        let webhook_secret = std::env::var("WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());
        if webhook_secret.is_none() {
            warn!("WEBHOOK_SECRET is not set, ingestion routes are unprotected");
        }

        Ok(Self {
            webhook_secret,
            orchestrator: Arc::new(Orchestrator::from_env()?),
            cancel: CancelFlag::new(),
        })
    }
}
