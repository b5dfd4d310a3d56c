//! Terminal error handling: classification and the failure record.
//!
//! Every run that ends in `Failed` produces exactly one [`ErrorRecord`]:
//! a category, a retriability verdict and enough identity to find the
//! execution again. The record feeds the failure notification and the
//! final log line; chunk-level failures never come through here, they only
//! degrade review completeness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{ConfigError, Error, ProviderError};
use crate::model::{ChunkFailure, ChunkFailureKind, ReviewRequest};
use crate::workflow::Stage;

/// Broad failure category, used for notifications and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    #[serde(rename = "API_ERROR")]
    Api,
    #[serde(rename = "AUTHENTICATION_ERROR")]
    Authentication,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimit,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "RESOURCE_ERROR")]
    Resource,
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorCategory {
    /// Whether rerunning the whole execution has a chance of succeeding.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            ErrorCategory::Api | ErrorCategory::RateLimit | ErrorCategory::Resource
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Api => "API_ERROR",
            ErrorCategory::Authentication => "AUTHENTICATION_ERROR",
            ErrorCategory::RateLimit => "RATE_LIMIT_ERROR",
            ErrorCategory::Validation => "VALIDATION_ERROR",
            ErrorCategory::Resource => "RESOURCE_ERROR",
            ErrorCategory::Unknown => "UNKNOWN_ERROR",
        };
        f.write_str(s)
    }
}

/// Maps a run-terminal error to its category.
pub fn classify(error: &Error) -> ErrorCategory {
    match error {
        Error::Provider(p) => match p {
            ProviderError::Unauthorized | ProviderError::Forbidden => ErrorCategory::Authentication,
            ProviderError::RateLimited { .. } => ErrorCategory::RateLimit,
            ProviderError::NotFound => ErrorCategory::Resource,
            ProviderError::Timeout
            | ProviderError::Network(_)
            | ProviderError::Server(_)
            | ProviderError::HttpStatus(_) => ErrorCategory::Api,
            ProviderError::Serde(_)
            | ProviderError::InvalidResponse(_)
            | ProviderError::Unsupported => ErrorCategory::Validation,
        },
        Error::Config(ConfigError::MissingToken(_)) => ErrorCategory::Authentication,
        Error::Config(_) => ErrorCategory::Validation,
        Error::Input(_) | Error::Validation(_) | Error::Split(_) => ErrorCategory::Validation,
        // Publish wraps exhausted provider attempts.
        Error::Publish { .. } => ErrorCategory::Api,
        Error::Cancelled | Error::Other(_) => ErrorCategory::Unknown,
    }
}

/// Maps a chunk's terminal failure kind to a record category.
pub fn classify_chunk_failure(kind: ChunkFailureKind) -> ErrorCategory {
    match kind {
        ChunkFailureKind::RateLimited => ErrorCategory::RateLimit,
        ChunkFailureKind::Timeout
        | ChunkFailureKind::Transport
        | ChunkFailureKind::Server => ErrorCategory::Api,
        ChunkFailureKind::Rejected | ChunkFailureKind::Invalid => ErrorCategory::Validation,
    }
}

/// The single failure record of a `Failed` execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub execution_id: Uuid,
    /// Stage that was active when the run failed.
    pub stage: Stage,
    pub category: ErrorCategory,
    pub retriable: bool,
    pub message: String,
    pub repository: String,
    pub pr_number: u64,
    /// Set when the failure is attributable to one chunk; stage-level
    /// failures leave it empty.
    #[serde(default)]
    pub chunk_seq: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn from_error(
        execution_id: Uuid,
        request: &ReviewRequest,
        stage: Stage,
        error: &Error,
    ) -> Self {
        let category = classify(error);
        Self {
            execution_id,
            stage,
            category,
            retriable: category.is_retriable(),
            message: error.to_string(),
            repository: request.repository.clone(),
            pr_number: request.pr_number,
            chunk_seq: None,
            timestamp: Utc::now(),
        }
    }

    /// Record for one chunk's terminal failure. Chunk failures never end
    /// the run, so these records feed logs and downstream consumers only.
    pub fn from_chunk_failure(
        execution_id: Uuid,
        request: &ReviewRequest,
        seq: u32,
        failure: &ChunkFailure,
    ) -> Self {
        let category = classify_chunk_failure(failure.kind);
        Self {
            execution_id,
            stage: Stage::Analyzing,
            category,
            retriable: category.is_retriable(),
            message: failure.message.clone(),
            repository: request.repository.clone(),
            pr_number: request.pr_number,
            chunk_seq: Some(seq),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InputError;
    use crate::model::ProviderKind;

    fn request() -> ReviewRequest {
        ReviewRequest {
            provider: ProviderKind::GitHub,
            repository: "acme/widgets".into(),
            pr_number: 9,
            title: "t".into(),
            author: "a".into(),
            source_branch: "s".into(),
            target_branch: "m".into(),
            head_sha: None,
            pr_url: None,
            diff: None,
        }
    }

    #[test]
    fn categories_follow_the_provider_mapping() {
        assert_eq!(
            classify(&Error::Provider(ProviderError::Unauthorized)),
            ErrorCategory::Authentication
        );
        assert_eq!(
            classify(&Error::Provider(ProviderError::RateLimited {
                retry_after_secs: Some(30)
            })),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            classify(&Error::Provider(ProviderError::NotFound)),
            ErrorCategory::Resource
        );
        assert_eq!(
            classify(&Error::Provider(ProviderError::Server(503))),
            ErrorCategory::Api
        );
        assert_eq!(
            classify(&Error::Input(InputError::MissingRepository)),
            ErrorCategory::Validation
        );
        assert_eq!(
            classify(&Error::Publish {
                attempts: 3,
                message: "boom".into()
            }),
            ErrorCategory::Api
        );
        assert_eq!(classify(&Error::Cancelled), ErrorCategory::Unknown);
    }

    #[test]
    fn retriability_follows_category() {
        assert!(ErrorCategory::Api.is_retriable());
        assert!(ErrorCategory::RateLimit.is_retriable());
        assert!(ErrorCategory::Resource.is_retriable());
        assert!(!ErrorCategory::Authentication.is_retriable());
        assert!(!ErrorCategory::Validation.is_retriable());
        assert!(!ErrorCategory::Unknown.is_retriable());
    }

    #[test]
    fn record_carries_classification_and_identity() {
        let req = request();
        let record = ErrorRecord::from_error(
            req.execution_id(),
            &req,
            Stage::Publishing,
            &Error::Provider(ProviderError::Unauthorized),
        );
        assert_eq!(record.stage, Stage::Publishing);
        assert_eq!(record.category, ErrorCategory::Authentication);
        assert!(!record.retriable);
        assert_eq!(record.repository, "acme/widgets");
        assert_eq!(record.chunk_seq, None);
        assert!(record.message.contains("unauthorized"));
    }

    #[test]
    fn chunk_failures_carry_their_seq() {
        let req = request();
        let failure = ChunkFailure {
            kind: ChunkFailureKind::RateLimited,
            message: "HTTP 429".into(),
            attempts: 3,
        };
        let record = ErrorRecord::from_chunk_failure(req.execution_id(), &req, 4, &failure);
        assert_eq!(record.stage, Stage::Analyzing);
        assert_eq!(record.chunk_seq, Some(4));
        assert_eq!(record.category, ErrorCategory::RateLimit);
        assert!(record.retriable);
    }

    #[test]
    fn category_serializes_in_wire_format() {
        let json = serde_json::to_string(&ErrorCategory::RateLimit).unwrap();
        assert_eq!(json, "\"RATE_LIMIT_ERROR\"");
    }
}
