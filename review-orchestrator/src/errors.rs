//! Crate-wide error hierarchy for review-orchestrator.
//!
//! Goals:
//! - Single root `Error` for all public functions.
//! - Provider-aware mapping (401→Unauthorized, 429→RateLimited, 5xx→Server, etc.).
//! - No dynamic dispatch, no async-trait, ergonomic `?` via `From` impls.
//!
//! Chunk-level analysis failures are deliberately NOT part of this hierarchy:
//! they are data (`ChunkFailure` in the model) and only degrade review
//! completeness. The root `Error` is reserved for failures that end the run.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type PrResult<T> = Result<T, Error>;

/// Root error type for the review-orchestrator crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Review request rejected before the workflow starts.
    #[error(transparent)]
    Input(#[from] InputError),

    /// Provider (GitHub/GitLab/Bitbucket) related failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Chunk splitting failure that could not be degraded away.
    #[error(transparent)]
    Split(#[from] SplitError),

    /// Configuration problems (bad/missing tokens, base URL, etc.).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Publishing failed after exhausting its retry budget.
    #[error("publish failed after {attempts} attempts: {message}")]
    Publish { attempts: u32, message: String },

    /// The execution was cancelled at a stage boundary.
    #[error("execution cancelled")]
    Cancelled,

    /// Input validation errors outside of request ingestion.
    #[error("validation error: {0}")]
    Validation(String),

    /// Generic catch-all error when nothing else fits.
    #[error("other error: {0}")]
    Other(String),
}

/// Request ingestion errors. These are fatal before the workflow starts;
/// nothing is published or notified for them.
#[derive(Debug, Error)]
pub enum InputError {
    /// Repository identity missing or empty.
    #[error("missing repository identity")]
    MissingRepository,

    /// PR/MR number must be positive.
    #[error("invalid pull request number: {0}")]
    InvalidPrNumber(u64),

    /// Provider name not recognized.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
}

/// Detailed provider-specific error used inside the Provider layer.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Unauthorized (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden (HTTP 403).
    #[error("forbidden")]
    Forbidden,

    /// Not found (HTTP 404).
    #[error("not found")]
    NotFound,

    /// Rate limited (HTTP 429).
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Gateway/Server error (HTTP 5xx).
    #[error("server error: status {0}")]
    Server(u16),

    /// Other HTTP status (4xx/3xx) not covered above.
    #[error("http status error: {0}")]
    HttpStatus(u16),

    /// Timeout at transport level.
    #[error("timeout")]
    Timeout,

    /// Network/transport failure without status (DNS/connect/reset).
    #[error("network error: {0}")]
    Network(String),

    /// JSON deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Unexpected/invalid shape of provider response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Operation not supported by provider.
    #[error("unsupported provider operation")]
    Unsupported,
}

impl ProviderError {
    /// Whether a retry of the same call has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Server(_)
                | ProviderError::Timeout
                | ProviderError::Network(_)
        )
    }
}

/// Chunk splitting errors. The splitter degrades these to single-file
/// chunking; they surface in the root error only when even the fallback
/// cannot run.
#[derive(Debug, Error)]
pub enum SplitError {
    /// Too many files to build a reference graph within bounds.
    #[error("change set too large for graph build: {files} files (max {max})")]
    GraphTooLarge { files: usize, max: usize },
}

/// Configuration and setup errors (base API URL, missing token, etc.).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing provider token: set {0}")]
    MissingToken(&'static str),

    #[error("invalid base api url: {0}")]
    InvalidBaseUrl(String),
}

// ===== Conversions for `?` ergonomics =====

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Provider(ProviderError::from(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Provider(ProviderError::Serde(e))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ProviderError::Timeout;
        }
        if let Some(status) = e.status() {
            let code = status.as_u16();
            return match code {
                401 => ProviderError::Unauthorized,
                403 => ProviderError::Forbidden,
                404 => ProviderError::NotFound,
                429 => ProviderError::RateLimited {
                    retry_after_secs: None,
                },
                500..=599 => ProviderError::Server(code),
                _ => ProviderError::HttpStatus(code),
            };
        }
        ProviderError::Network(e.to_string())
    }
}
