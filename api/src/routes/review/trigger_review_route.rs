use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use review_orchestrator::{
    ReviewRequest,
    git_providers::{PrId, ProviderClient},
};
use tracing::{info, instrument};

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppError,
    routes::review::{
        check_secret, review_queued_response::ReviewQueuedResponse, spawn_review,
        trigger_review_request::TriggerReviewRequest,
    },
};

/// POST /api/review/trigger
///
/// Secret-protected manual trigger for operators and CI jobs. When the body
/// does not pin a head revision, PR metadata is resolved from the provider
/// first so the execution id stays stable across reruns of the same head.
#[instrument(name = "trigger_review_route", skip(state, headers, body))]
pub async fn trigger_review_route(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<TriggerReviewRequest>,
) -> Response {
    if let Some(denied) = check_secret(state.webhook_secret.as_deref(), &headers) {
        return denied;
    }

    let mut request = ReviewRequest {
        provider: body.provider,
        repository: body.repository,
        pr_number: body.pr_number,
        title: String::new(),
        author: String::new(),
        source_branch: String::new(),
        target_branch: String::new(),
        head_sha: body.head_sha,
        pr_url: None,
        diff: body.diff,
    };

    if let Err(e) = request.validate() {
        return ApiResponse::<()>::error("BAD_REQUEST", e.to_string(), Vec::new())
            .into_response_with_status(StatusCode::BAD_REQUEST);
    }

    if request.head_sha.is_none() {
        let client = match ProviderClient::from_env(request.provider) {
            Ok(client) => client,
            Err(e) => {
                return AppError::Http {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "CONFIG_ERROR",
                    message: e.to_string(),
                }
                .into_response();
            }
        };

        let id = PrId::new(request.repository.clone(), request.pr_number);
        match client.fetch_meta(&id).await {
            Ok(meta) => {
                request.title = meta.title;
                request.author = meta.author;
                request.source_branch = meta.source_branch;
                request.target_branch = meta.target_branch;
                request.head_sha = meta.head_sha;
                request.pr_url = meta.web_url;
            }
            Err(e) => {
                return AppError::Http {
                    status: StatusCode::BAD_GATEWAY,
                    code: "PROVIDER_ERROR",
                    message: format!("provider error: {e}"),
                }
                .into_response();
            }
        }
    }

    let execution = match state.orchestrator.start(request) {
        Ok(execution) => execution,
        Err(e) => {
            return ApiResponse::<()>::error("BAD_REQUEST", e.to_string(), Vec::new())
                .into_response_with_status(StatusCode::BAD_REQUEST);
        }
    };

    let execution_id = spawn_review(&state, execution);
    info!(%execution_id, "manual review trigger accepted");
    ApiResponse::success(ReviewQueuedResponse {
        execution_id: Some(execution_id),
        message: "review queued".into(),
    })
    .into_response_with_status(StatusCode::ACCEPTED)
}
