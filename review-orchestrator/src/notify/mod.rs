//! Stage 6: fire-and-forget Slack notifier.
//!
//! Sends one Block Kit message per finished execution (success or failure)
//! via `chat.postMessage`. Carries its own small retry budget and absorbs
//! every error: a lost notification never changes the outcome of a run.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::NotifyConfig;
use crate::error_handler::ErrorRecord;
use crate::errors::Error;
use crate::model::{AggregatedReview, ReviewRequest};

const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(1);
const MESSAGE_CLIP_BYTES: usize = 1000;

#[derive(Debug, Clone)]
pub struct SlackNotifier {
    http: reqwest::Client,
    cfg: NotifyConfig,
}

impl SlackNotifier {
    pub fn new(cfg: NotifyConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            cfg,
        }
    }

    pub fn from_env() -> Self {
        Self::new(NotifyConfig::from_env())
    }

    /// Posts the finished-review message. Partial reviews get a warning
    /// header instead of the success one.
    pub async fn notify_success(
        &self,
        request: &ReviewRequest,
        review: &AggregatedReview,
        duration: Duration,
    ) {
        if !self.cfg.is_enabled() {
            debug!("stage6: notifications disabled, skipping");
            return;
        }
        let fallback = format!(
            "Code review finished for {}#{}",
            request.repository, request.pr_number
        );
        self.post(success_blocks(request, review, duration), &fallback)
            .await;
    }

    /// Posts the failure message for a `Failed` execution.
    pub async fn notify_failure(&self, record: &ErrorRecord) {
        if !self.cfg.is_enabled() {
            debug!("stage6: notifications disabled, skipping");
            return;
        }
        let fallback = format!("Code review failed: {}", record.category);
        self.post(failure_blocks(record), &fallback).await;
    }

    async fn post(&self, blocks: Vec<Value>, fallback: &str) {
        // is_enabled() holds here, so both values exist.
        let (Some(token), Some(channel)) = (&self.cfg.bot_token, &self.cfg.channel) else {
            return;
        };
        let payload = json!({
            "channel": channel,
            "blocks": blocks,
            "text": fallback,
        });

        for attempt in 0..MAX_ATTEMPTS {
            match self.send_once(token, &payload).await {
                Ok(()) => {
                    debug!("stage6: notification delivered");
                    return;
                }
                Err(err) => {
                    if attempt + 1 < MAX_ATTEMPTS {
                        let delay = RETRY_BASE * 2u32.pow(attempt);
                        warn!(
                            "stage6: notification attempt {}/{} failed ({}), retrying in {} ms",
                            attempt + 1,
                            MAX_ATTEMPTS,
                            err,
                            delay.as_millis()
                        );
                        sleep(delay).await;
                    } else {
                        warn!(
                            "stage6: notification dropped after {} attempts: {}",
                            MAX_ATTEMPTS, err
                        );
                    }
                }
            }
        }
    }

    async fn send_once(&self, token: &str, payload: &Value) -> Result<(), Error> {
        let resp: SlackResponse = self
            .http
            .post(SLACK_POST_MESSAGE_URL)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !resp.ok {
            return Err(Error::Other(format!(
                "slack api error: {}",
                resp.error.unwrap_or_else(|| "unknown".into())
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Blocks for a finished review, complete or partial.
pub(crate) fn success_blocks(
    request: &ReviewRequest,
    review: &AggregatedReview,
    duration: Duration,
) -> Vec<Value> {
    let header = if review.complete {
        "\u{2705} Code Review Complete"
    } else {
        "\u{26A0}\u{FE0F} Code Review Partially Complete"
    };
    let stats = &review.stats;

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": header }
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Repository:*\n{}", request.repository) },
                { "type": "mrkdwn", "text": format!("*PR:*\n#{} {}", request.pr_number, request.title) },
            ]
        }),
        json!({
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": format!(
                    "*Files:* {} | *Issues:* {} | *Chunks:* {}/{} analyzed | *Duration:* {:.1}s",
                    stats.files_total,
                    stats.by_severity.total(),
                    stats.analyzed_chunks,
                    stats.total_chunks,
                    duration.as_secs_f64()
                )
            }]
        }),
    ];

    if let Some(url) = &request.pr_url {
        blocks.push(json!({
            "type": "actions",
            "elements": [{
                "type": "button",
                "text": { "type": "plain_text", "text": "View PR" },
                "url": url,
            }]
        }));
    }

    blocks
}

/// Blocks for a failed execution.
pub(crate) fn failure_blocks(record: &ErrorRecord) -> Vec<Value> {
    let stage_text = match record.chunk_seq {
        Some(seq) => format!("*Stage:*\n{} (chunk {})", record.stage, seq),
        None => format!("*Stage:*\n{}", record.stage),
    };
    vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("\u{274C} Code Review Error: {}", record.category)
            }
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Repository:*\n{}", record.repository) },
                { "type": "mrkdwn", "text": format!("*PR:*\n#{}", record.pr_number) },
            ]
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": stage_text },
                { "type": "mrkdwn", "text": format!("*Execution:*\n{}", record.execution_id) },
            ]
        }),
        json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*Error Message:*\n```{}```", clip(&record.message, MESSAGE_CLIP_BYTES))
            }
        }),
        json!({
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": format!(
                    "Retriable: {} | {}",
                    if record.retriable { "\u{2705}" } else { "\u{274C}" },
                    record.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                )
            }]
        }),
    ]
}

/// Byte-bounded clip on a char boundary (Slack blocks have size limits).
fn clip(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut cut = max_bytes;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    &s[..cut]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handler::ErrorCategory;
    use crate::model::{ProviderKind, ReviewStats};
    use crate::workflow::Stage;
    use chrono::Utc;
    use uuid::Uuid;

    fn request(url: Option<&str>) -> ReviewRequest {
        ReviewRequest {
            provider: ProviderKind::GitHub,
            repository: "acme/widgets".into(),
            pr_number: 5,
            title: "Speed up parser".into(),
            author: "dev".into(),
            source_branch: "perf/parser".into(),
            target_branch: "main".into(),
            head_sha: Some("abc".into()),
            pr_url: url.map(String::from),
            diff: None,
        }
    }

    fn review(complete: bool) -> AggregatedReview {
        AggregatedReview {
            execution_id: Uuid::new_v4(),
            complete,
            findings: Vec::new(),
            failed_chunks: Vec::new(),
            stats: ReviewStats {
                total_chunks: 4,
                analyzed_chunks: if complete { 4 } else { 3 },
                failed_chunks: if complete { 0 } else { 1 },
                files_total: 6,
                ..Default::default()
            },
            body_markdown: String::new(),
        }
    }

    #[test]
    fn complete_reviews_get_the_success_header() {
        let blocks = success_blocks(
            &request(Some("https://github.com/acme/widgets/pull/5")),
            &review(true),
            Duration::from_secs(42),
        );
        assert_eq!(
            blocks[0]["text"]["text"],
            "\u{2705} Code Review Complete"
        );
        // PR link button present
        assert_eq!(blocks.last().unwrap()["type"], "actions");
    }

    #[test]
    fn partial_reviews_get_the_warning_header_and_no_button_without_url() {
        let blocks = success_blocks(&request(None), &review(false), Duration::from_secs(10));
        assert!(
            blocks[0]["text"]["text"]
                .as_str()
                .unwrap()
                .contains("Partially Complete")
        );
        assert!(blocks.iter().all(|b| b["type"] != "actions"));
    }

    #[test]
    fn failure_blocks_carry_category_stage_and_retriability() {
        let record = ErrorRecord {
            execution_id: Uuid::new_v4(),
            stage: Stage::Publishing,
            category: ErrorCategory::RateLimit,
            retriable: true,
            message: "rate limited".into(),
            repository: "acme/widgets".into(),
            pr_number: 5,
            chunk_seq: None,
            timestamp: Utc::now(),
        };
        let blocks = failure_blocks(&record);
        let rendered = serde_json::to_string(&blocks).unwrap();
        assert!(rendered.contains("RATE_LIMIT_ERROR"));
        assert!(rendered.contains("publishing"));
        assert!(rendered.contains("Retriable: \u{2705}"));
    }

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip("short", 100), "short");
        let s = "a\u{00E9}xyz"; // 'é' spans bytes 1..3
        assert_eq!(clip(s, 2), "a");
        assert_eq!(clip(s, 3), "a\u{00E9}");
    }
}
