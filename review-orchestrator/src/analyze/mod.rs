//! Stage 3: chunk analysis client.
//!
//! Wraps the LLM service with the per-chunk policy:
//!
//! 1. Build the prompt from the chunk.
//! 2. Run each attempt under the per-attempt timeout.
//! 3. Retry transient failures (timeout, 429, 5xx, transport) with
//!    exponential backoff; fail fast on rejection (other 4xx).
//! 4. Parse the output; a delivered-but-unusable body salvages as zero
//!    findings.
//!
//! `analyze_chunk` never returns an error: every failure mode is absorbed
//! into the chunk's own result. Nothing here can touch a sibling chunk or
//! abort the run.

pub mod parse;
pub mod prompt;

use std::future::Future;
use std::time::Instant;

use ai_llm_service::LlmService;
use ai_llm_service::error_handler::AiLlmError;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::model::{Chunk, ChunkFailure, ChunkFailureKind, ChunkResult};

/// Analyzes one chunk end to end. Infallible by contract: failures become
/// `ChunkResult::failed`.
pub async fn analyze_chunk(
    llm: &LlmService,
    chunk: &Chunk,
    policy: &RetryPolicy,
    primary_weight_threshold: f32,
) -> ChunkResult {
    let t0 = Instant::now();
    let prompt = prompt::build_chunk_prompt(chunk, primary_weight_threshold);

    match generate_with_retry(chunk.seq, policy, || llm.generate(&prompt)).await {
        Ok((raw, attempts)) => {
            let findings = match parse::parse_findings(&raw, chunk) {
                Some(f) => f,
                None => {
                    warn!(
                        "stage3: chunk {} returned non-JSON output, salvaging as clean",
                        chunk.seq
                    );
                    Vec::new()
                }
            };
            debug!(
                "stage3: chunk {} analyzed findings={} attempts={} in {} ms",
                chunk.seq,
                findings.len(),
                attempts,
                t0.elapsed().as_millis()
            );
            ChunkResult::ok(chunk.seq, findings)
        }
        Err(failure) => {
            warn!(
                "stage3: chunk {} failed ({}) after {} attempt(s): {}",
                chunk.seq, failure.kind, failure.attempts, failure.message
            );
            ChunkResult::failed(chunk.seq, failure)
        }
    }
}

/// Retry loop around one generation call.
///
/// Generic over the operation so tests can inject failure sequences with a
/// zero-delay policy. Returns the raw output plus attempts used, or the
/// terminal [`ChunkFailure`].
pub(crate) async fn generate_with_retry<F, Fut>(
    seq: u32,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<(String, u32), ChunkFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, AiLlmError>>,
{
    let mut last: Option<(ChunkFailureKind, String)> = None;
    let mut attempts = 0u32;

    for attempt in 0..policy.max_attempts.max(1) {
        attempts = attempt + 1;

        let (kind, message, transient) = match timeout(policy.attempt_timeout, op()).await {
            Ok(Ok(raw)) => return Ok((raw, attempts)),
            Ok(Err(err)) => {
                let (kind, transient) = classify_llm_error(&err);
                (kind, err.to_string(), transient)
            }
            Err(_) => (
                ChunkFailureKind::Timeout,
                format!(
                    "attempt timed out after {} ms",
                    policy.attempt_timeout.as_millis()
                ),
                true,
            ),
        };

        if !transient {
            return Err(ChunkFailure {
                kind,
                message,
                attempts,
            });
        }

        if attempt + 1 < policy.max_attempts {
            let delay = policy.backoff_delay(attempt);
            debug!(
                "stage3: chunk {} attempt {}/{} failed ({}), retrying in {} ms",
                seq,
                attempts,
                policy.max_attempts,
                kind,
                delay.as_millis()
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
        last = Some((kind, message));
    }

    let (kind, message) =
        last.unwrap_or((ChunkFailureKind::Invalid, "no attempt executed".to_string()));
    Err(ChunkFailure {
        kind,
        message,
        attempts,
    })
}

/// Maps an LLM service error to a chunk failure kind and retryability.
fn classify_llm_error(err: &AiLlmError) -> (ChunkFailureKind, bool) {
    match err {
        AiLlmError::HttpStatus { status, .. } => {
            let code = status.as_u16();
            if code == 429 {
                (ChunkFailureKind::RateLimited, true)
            } else if (500..=599).contains(&code) {
                (ChunkFailureKind::Server, true)
            } else {
                (ChunkFailureKind::Rejected, false)
            }
        }
        AiLlmError::Transport(e) => {
            if e.is_timeout() {
                (ChunkFailureKind::Timeout, true)
            } else {
                (ChunkFailureKind::Transport, true)
            }
        }
        AiLlmError::Decode(_) => (ChunkFailureKind::Invalid, false),
        AiLlmError::Config(_) | AiLlmError::InvalidProvider | AiLlmError::InvalidEndpoint(_) => {
            (ChunkFailureKind::Rejected, false)
        }
        // Future variants: assume transport-ish and let the retry budget decide.
        _ => (ChunkFailureKind::Transport, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::cell::Cell;
    use std::time::Duration;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            attempt_timeout: Duration::from_millis(50),
        }
    }

    fn rate_limited() -> AiLlmError {
        AiLlmError::HttpStatus {
            status: StatusCode::TOO_MANY_REQUESTS,
            url: "http://llm/api/generate".into(),
            snippet: "slow down".into(),
        }
    }

    fn rejected() -> AiLlmError {
        AiLlmError::HttpStatus {
            status: StatusCode::BAD_REQUEST,
            url: "http://llm/api/generate".into(),
            snippet: "prompt too large".into(),
        }
    }

    #[tokio::test]
    async fn transient_errors_retry_until_success() {
        let calls = Cell::new(0u32);
        let result = generate_with_retry(0, &fast_policy(3), || {
            let n = calls.get();
            calls.set(n + 1);
            async move {
                if n < 2 {
                    Err(rate_limited())
                } else {
                    Ok("{\"findings\":[]}".to_string())
                }
            }
        })
        .await;

        let (raw, attempts) = result.expect("should recover");
        assert_eq!(raw, "{\"findings\":[]}");
        assert_eq!(attempts, 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn fatal_errors_do_not_retry() {
        let calls = Cell::new(0u32);
        let result = generate_with_retry(0, &fast_policy(5), || {
            calls.set(calls.get() + 1);
            async { Err(rejected()) }
        })
        .await;

        let failure = result.expect_err("should fail");
        assert_eq!(failure.kind, ChunkFailureKind::Rejected);
        assert_eq!(failure.attempts, 1);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn retry_budget_is_exhausted() {
        let calls = Cell::new(0u32);
        let result = generate_with_retry(0, &fast_policy(3), || {
            calls.set(calls.get() + 1);
            async { Err(rate_limited()) }
        })
        .await;

        let failure = result.expect_err("should exhaust");
        assert_eq!(failure.kind, ChunkFailureKind::RateLimited);
        assert_eq!(failure.attempts, 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn hung_attempts_time_out_and_retry() {
        let result = generate_with_retry(0, &fast_policy(2), || async {
            std::future::pending::<Result<String, AiLlmError>>().await
        })
        .await;

        let failure = result.expect_err("should time out");
        assert_eq!(failure.kind, ChunkFailureKind::Timeout);
        assert_eq!(failure.attempts, 2);
    }

    #[test]
    fn classification_table() {
        assert_eq!(
            classify_llm_error(&rate_limited()),
            (ChunkFailureKind::RateLimited, true)
        );
        assert_eq!(
            classify_llm_error(&rejected()),
            (ChunkFailureKind::Rejected, false)
        );
        assert_eq!(
            classify_llm_error(&AiLlmError::HttpStatus {
                status: StatusCode::BAD_GATEWAY,
                url: String::new(),
                snippet: String::new(),
            }),
            (ChunkFailureKind::Server, true)
        );
        assert_eq!(
            classify_llm_error(&AiLlmError::Decode("not json".into())),
            (ChunkFailureKind::Invalid, false)
        );
    }
}
