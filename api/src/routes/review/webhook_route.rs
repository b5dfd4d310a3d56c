use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use review_orchestrator::ProviderKind;
use serde_json::Value;
use tracing::{info, instrument};

use crate::{
    core::{
        app_state::AppState,
        http::response_envelope::{ApiErrorDetail, ApiResponse},
    },
    routes::review::{
        check_secret, review_queued_response::ReviewQueuedResponse, spawn_review, webhook_payload,
    },
};

/// POST /api/review/webhook/{provider}
///
/// Raw provider webhook intake. PR opened/updated/reopened events queue a
/// review execution and answer 202 with its id; every other event is
/// acknowledged with 200 so the provider does not retry delivery.
#[instrument(name = "webhook_route", skip(state, headers, payload))]
pub async fn webhook_route(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    let Ok(kind) = ProviderKind::parse(&provider) else {
        let details = vec![ApiErrorDetail {
            path: Some("provider".into()),
            hint: Some("Use one of: github, gitlab, bitbucket.".into()),
        }];
        return ApiResponse::<()>::error(
            "BAD_REQUEST",
            format!("unsupported provider: {provider}"),
            details,
        )
        .into_response_with_status(StatusCode::BAD_REQUEST);
    };

    if let Some(denied) = check_secret(state.webhook_secret.as_deref(), &headers) {
        return denied;
    }

    let Some(request) = webhook_payload::normalize(kind, &payload) else {
        info!("webhook event ignored for provider {kind}");
        return ApiResponse::success(ReviewQueuedResponse {
            execution_id: None,
            message: "event ignored".into(),
        })
        .into_response_with_status(StatusCode::OK);
    };

    let execution = match state.orchestrator.start(request) {
        Ok(execution) => execution,
        Err(e) => {
            return ApiResponse::<()>::error("BAD_REQUEST", e.to_string(), Vec::new())
                .into_response_with_status(StatusCode::BAD_REQUEST);
        }
    };

    let execution_id = spawn_review(&state, execution);
    ApiResponse::success(ReviewQueuedResponse {
        execution_id: Some(execution_id),
        message: "review queued".into(),
    })
    .into_response_with_status(StatusCode::ACCEPTED)
}
