//! Stage 5: idempotent publisher.
//!
//! Posts the aggregated review as ONE summary comment per execution.
//!
//! - Idempotency: embeds a hidden marker keyed by the execution id; a rerun
//!   of the same execution updates the existing comment instead of posting
//!   a duplicate.
//! - Retries: transient provider errors retry with backoff; exhaustion (or
//!   a fatal error) surfaces as [`Error::Publish`] and ends the run.
//! - Dry-run: compute and log actions without actually calling the API.
//! - No async-trait, no Box<dyn ...>; plain async fn + enum dispatch.

use std::future::Future;
use std::time::Instant;

use tokio::time::{sleep, timeout};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{PublishConfig, RetryPolicy};
use crate::errors::{Error, PrResult};
use crate::git_providers::{ExistingComment, PrId, ProviderClient};
use crate::model::AggregatedReview;

const MARKER_PREFIX: &str = "<!-- pr-reviewer:key=";
const MARKER_SUFFIX: &str = ";ver=1 -->";
const TRUNCATION_NOTE: &str = "\n\n_Review truncated to fit the provider comment limit._";

/// Result of publishing one aggregated review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedReview {
    /// Was a network POST/PUT performed (false in dry-run or disabled)?
    pub performed: bool,
    /// Was a new comment created (true) or an existing one updated (false)?
    pub created_new: bool,
    /// Provider comment id when known.
    pub comment_id: Option<u64>,
    /// Attempts spent, including the successful one.
    pub attempts: u32,
}

/// What publishing would do against the listed comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishAction {
    Create,
    Update { comment_id: u64 },
}

/// Hidden HTML marker carrying the execution key.
pub fn render_marker(execution_id: &Uuid) -> String {
    format!("{MARKER_PREFIX}{execution_id}{MARKER_SUFFIX}")
}

/// Extracts the execution key from a comment body, if it carries a marker.
pub fn find_marker(body: &str) -> Option<Uuid> {
    let start = body.find(MARKER_PREFIX)? + MARKER_PREFIX.len();
    let rest = &body[start..];
    let end = rest.find(';')?;
    Uuid::parse_str(&rest[..end]).ok()
}

/// Pure update-vs-create decision over the listed comments.
pub fn decide_action(existing: &[ExistingComment], execution_id: &Uuid) -> PublishAction {
    for comment in existing {
        if find_marker(&comment.body) == Some(*execution_id) {
            return PublishAction::Update {
                comment_id: comment.id,
            };
        }
    }
    PublishAction::Create
}

/// Appends the marker and enforces the provider size cap.
///
/// `max_bytes == 0` disables the cap. Truncation cuts on a char boundary
/// and always keeps the marker so idempotency survives oversized reviews.
pub fn compose_body(markdown: &str, marker: &str, max_bytes: usize) -> String {
    let framed_len = markdown.len() + 2 + marker.len();
    if max_bytes == 0 || framed_len <= max_bytes {
        return format!("{markdown}\n\n{marker}");
    }

    let reserved = TRUNCATION_NOTE.len() + 2 + marker.len();
    let mut cut = max_bytes.saturating_sub(reserved).min(markdown.len());
    while cut > 0 && !markdown.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}\n\n{}", &markdown[..cut], TRUNCATION_NOTE, marker)
}

/// Publishes the review for one execution.
///
/// `client` may be `None` when the config never writes (disabled or
/// dry-run); callers gate client construction on
/// [`PublishConfig::requires_provider`].
pub async fn publish_review(
    client: Option<&ProviderClient>,
    id: &PrId,
    review: &AggregatedReview,
    cfg: &PublishConfig,
) -> PrResult<PublishedReview> {
    let t0 = Instant::now();

    if !cfg.enabled {
        info!(
            "stage5: publish disabled, skipping execution={}",
            review.execution_id
        );
        return Ok(PublishedReview {
            performed: false,
            created_new: false,
            comment_id: None,
            attempts: 0,
        });
    }

    let marker = render_marker(&review.execution_id);
    let body = compose_body(&review.body_markdown, &marker, cfg.max_comment_bytes);
    info!(
        "stage5: publish start execution={} body_bytes={} dry_run={}",
        review.execution_id,
        body.len(),
        cfg.dry_run
    );

    if cfg.dry_run {
        info!(
            "stage5: dry-run, would post review comment for {}#{}",
            id.repository, id.number
        );
        return Ok(PublishedReview {
            performed: false,
            created_new: false,
            comment_id: None,
            attempts: 0,
        });
    }

    let client = client.ok_or_else(|| Error::Publish {
        attempts: 0,
        message: "no provider client available for a live publish".into(),
    })?;

    let execution_id = review.execution_id;
    let result = with_publish_retry(&cfg.retry, || {
        publish_once(client, id, &execution_id, &body)
    })
    .await?;

    info!(
        "stage5: publish done created_new={} comment_id={:?} attempts={} in {} ms",
        result.created_new,
        result.comment_id,
        result.attempts,
        t0.elapsed().as_millis()
    );
    Ok(result)
}

/// One list-decide-write pass against the provider.
async fn publish_once(
    client: &ProviderClient,
    id: &PrId,
    execution_id: &Uuid,
    body: &str,
) -> PrResult<PublishedReview> {
    let existing = client.list_comments(id).await?;
    match decide_action(&existing, execution_id) {
        PublishAction::Update { comment_id } => {
            client.update_comment(id, comment_id, body).await?;
            Ok(PublishedReview {
                performed: true,
                created_new: false,
                comment_id: Some(comment_id),
                attempts: 0,
            })
        }
        PublishAction::Create => {
            let comment_id = client.create_comment(id, body).await?;
            Ok(PublishedReview {
                performed: true,
                created_new: true,
                comment_id: Some(comment_id),
                attempts: 0,
            })
        }
    }
}

/// Retry loop for the publish call. Transient provider errors retry with
/// backoff; anything else maps straight to [`Error::Publish`].
async fn with_publish_retry<F, Fut>(policy: &RetryPolicy, mut op: F) -> PrResult<PublishedReview>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PrResult<PublishedReview>>,
{
    let mut last_message = String::new();
    let mut attempts = 0u32;

    for attempt in 0..policy.max_attempts.max(1) {
        attempts = attempt + 1;

        let message = match timeout(policy.attempt_timeout, op()).await {
            Ok(Ok(mut published)) => {
                published.attempts = attempts;
                return Ok(published);
            }
            Ok(Err(err)) => {
                let transient = matches!(&err, Error::Provider(p) if p.is_transient());
                if !transient {
                    return Err(Error::Publish {
                        attempts,
                        message: err.to_string(),
                    });
                }
                err.to_string()
            }
            Err(_) => format!(
                "attempt timed out after {} ms",
                policy.attempt_timeout.as_millis()
            ),
        };

        if attempt + 1 < policy.max_attempts {
            let delay = policy.backoff_delay(attempt);
            warn!(
                "stage5: publish attempt {}/{} failed ({}), retrying in {} ms",
                attempts,
                policy.max_attempts,
                message,
                delay.as_millis()
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
        last_message = message;
    }

    Err(Error::Publish {
        attempts,
        message: last_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use std::cell::Cell;
    use std::time::Duration;

    fn zero_delay(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            attempt_timeout: Duration::from_millis(50),
        }
    }

    fn published() -> PublishedReview {
        PublishedReview {
            performed: true,
            created_new: true,
            comment_id: Some(7),
            attempts: 0,
        }
    }

    #[test]
    fn marker_round_trips() {
        let id = Uuid::new_v4();
        let marker = render_marker(&id);
        assert_eq!(find_marker(&marker), Some(id));
        assert_eq!(
            find_marker(&format!("review text\n\n{marker}\ntrailing")),
            Some(id)
        );
        assert_eq!(find_marker("no marker here"), None);
    }

    #[test]
    fn action_updates_only_on_matching_key() {
        let ours = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        let existing = vec![
            ExistingComment {
                id: 1,
                body: "human chatter".into(),
            },
            ExistingComment {
                id: 2,
                body: format!("old run\n\n{}", render_marker(&theirs)),
            },
            ExistingComment {
                id: 3,
                body: format!("our run\n\n{}", render_marker(&ours)),
            },
        ];

        assert_eq!(
            decide_action(&existing, &ours),
            PublishAction::Update { comment_id: 3 }
        );
        assert_eq!(
            decide_action(&existing[..2], &ours),
            PublishAction::Create
        );
    }

    #[test]
    fn oversized_body_is_truncated_but_keeps_marker() {
        let id = Uuid::new_v4();
        let marker = render_marker(&id);
        let long = "x".repeat(10_000);

        let body = compose_body(&long, &marker, 500);
        assert!(body.len() <= 500);
        assert!(body.contains("truncated"));
        assert_eq!(find_marker(&body), Some(id));

        let untouched = compose_body("short", &marker, 500);
        assert!(untouched.starts_with("short"));
        assert!(untouched.ends_with(&marker));
    }

    #[tokio::test]
    async fn disabled_and_dry_run_publishes_need_no_client() {
        use crate::model::ReviewStats;

        let review = AggregatedReview {
            execution_id: Uuid::new_v4(),
            complete: true,
            findings: Vec::new(),
            failed_chunks: Vec::new(),
            stats: ReviewStats::default(),
            body_markdown: "## Review".into(),
        };
        let id = PrId::new("acme/widgets", 7);

        let mut cfg = PublishConfig {
            enabled: false,
            dry_run: false,
            max_comment_bytes: 0,
            retry: zero_delay(1),
        };
        assert!(!cfg.requires_provider());
        let receipt = publish_review(None, &id, &review, &cfg).await.unwrap();
        assert!(!receipt.performed);

        cfg.enabled = true;
        cfg.dry_run = true;
        assert!(!cfg.requires_provider());
        let receipt = publish_review(None, &id, &review, &cfg).await.unwrap();
        assert!(!receipt.performed);
        assert!(receipt.comment_id.is_none());
    }

    #[tokio::test]
    async fn transient_publish_errors_retry() {
        let calls = Cell::new(0u32);
        let result = with_publish_retry(&zero_delay(3), || {
            let n = calls.get();
            calls.set(n + 1);
            async move {
                if n == 0 {
                    Err(Error::Provider(ProviderError::Server(502)))
                } else {
                    Ok(published())
                }
            }
        })
        .await
        .expect("should recover");

        assert_eq!(result.attempts, 2);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn fatal_publish_error_fails_immediately() {
        let calls = Cell::new(0u32);
        let err = with_publish_retry(&zero_delay(5), || {
            calls.set(calls.get() + 1);
            async { Err(Error::Provider(ProviderError::Unauthorized)) }
        })
        .await
        .expect_err("should fail");

        assert_eq!(calls.get(), 1);
        match err {
            Error::Publish { attempts, message } => {
                assert_eq!(attempts, 1);
                assert!(message.contains("unauthorized"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_publish_error() {
        let calls = Cell::new(0u32);
        let err = with_publish_retry(&zero_delay(3), || {
            calls.set(calls.get() + 1);
            async {
                Err(Error::Provider(ProviderError::RateLimited {
                    retry_after_secs: None,
                }))
            }
        })
        .await
        .expect_err("should exhaust");

        assert_eq!(calls.get(), 3);
        match err {
            Error::Publish { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }
}
