pub mod review_queued_response;
pub mod trigger_review_request;
pub mod trigger_review_route;
pub mod webhook_payload;
pub mod webhook_route;

use std::sync::Arc;

use axum::{
    http::{HeaderMap, StatusCode},
    response::Response,
};
use review_orchestrator::WorkflowExecution;
use tracing::info;
use uuid::Uuid;

use crate::core::app_state::AppState;
use crate::core::http::response_envelope::{ApiErrorDetail, ApiResponse};

/// Queues one review execution on the shared driver and returns its id.
///
/// The pipeline runs in a background task; failures are classified,
/// notified and logged there, so the handle is deliberately dropped.
pub(crate) fn spawn_review(state: &Arc<AppState>, execution: WorkflowExecution) -> Uuid {
    let execution_id = execution.execution_id;
    let orchestrator = Arc::clone(&state.orchestrator);
    let cancel = state.cancel.clone();
    tokio::spawn(async move {
        orchestrator.run_execution(execution, cancel).await;
    });
    info!(%execution_id, "review execution queued");
    execution_id
}

/// Validates the shared ingestion secret, if one is configured.
///
/// The secret travels in `X-Webhook-Secret`; `X-Gitlab-Token` is accepted
/// as an alias because GitLab webhooks can only send that header.
pub(crate) fn check_secret(expected: Option<&str>, headers: &HeaderMap) -> Option<Response> {
    let expected = expected?.trim();

    let provided = headers
        .get("X-Webhook-Secret")
        .or_else(|| headers.get("X-Gitlab-Token"))
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
        .trim();

    if provided.is_empty() || provided != expected {
        let details = vec![ApiErrorDetail {
            path: Some("X-Webhook-Secret".into()),
            hint: Some("Secret does not match the configured webhook secret.".into()),
        }];
        return Some(
            ApiResponse::<()>::error("UNAUTHORIZED", "Invalid webhook secret.", details)
                .into_response_with_status(StatusCode::UNAUTHORIZED),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn no_configured_secret_skips_the_check() {
        assert!(check_secret(None, &HeaderMap::new()).is_none());
    }

    #[test]
    fn matching_secret_passes_under_either_header() {
        let expected = Some("s3cret");
        assert!(check_secret(expected, &headers("X-Webhook-Secret", "s3cret")).is_none());
        assert!(check_secret(expected, &headers("X-Gitlab-Token", "s3cret")).is_none());
    }

    #[test]
    fn wrong_or_missing_secret_is_unauthorized() {
        let expected = Some("s3cret");

        let denied = check_secret(expected, &headers("X-Webhook-Secret", "nope"))
            .expect("mismatch must be denied");
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let denied = check_secret(expected, &HeaderMap::new()).expect("missing must be denied");
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    }
}
