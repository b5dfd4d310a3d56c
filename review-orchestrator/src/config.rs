//! Runtime configuration for the review pipeline.
//!
//! Everything is env-driven with hard defaults, loaded once at startup via
//! the `from_env` constructors. Retry behavior is an explicit value object
//! ([`RetryPolicy`]) handed down to the analyzer and publisher, so tests can
//! construct zero-delay variants instead of sleeping.

use std::time::Duration;

/// Retry/timeout policy for one category of remote calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Minimum 1.
    pub max_attempts: u32,
    /// Base backoff delay; attempt `n` sleeps `base_delay * 2^n`.
    pub base_delay: Duration,
    /// Per-attempt deadline for the remote call.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Backoff delay before retrying after attempt `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        // Saturate the shift; nobody retries 2^32 times.
        let factor = 2u64.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor as u32)
    }

    /// Analyzer policy from env.
    ///
    /// - `PR_REVIEWER_RETRY_ATTEMPTS` (default 3)
    /// - `PR_REVIEWER_RETRY_BASE_MS` (default 2000)
    /// - `PR_REVIEWER_ATTEMPT_TIMEOUT_SECS` (default 60)
    pub fn analyze_from_env() -> Self {
        Self {
            max_attempts: env_u32("PR_REVIEWER_RETRY_ATTEMPTS", 3).max(1),
            base_delay: Duration::from_millis(env_u64("PR_REVIEWER_RETRY_BASE_MS", 2000)),
            attempt_timeout: Duration::from_secs(env_u64("PR_REVIEWER_ATTEMPT_TIMEOUT_SECS", 60)),
        }
    }

    /// Publisher policy from env.
    ///
    /// - `PR_REVIEWER_PUBLISH_RETRY_ATTEMPTS` (default 3)
    /// - `PR_REVIEWER_PUBLISH_RETRY_BASE_MS` (default 1000)
    /// - `PR_REVIEWER_PUBLISH_TIMEOUT_SECS` (default 30)
    pub fn publish_from_env() -> Self {
        Self {
            max_attempts: env_u32("PR_REVIEWER_PUBLISH_RETRY_ATTEMPTS", 3).max(1),
            base_delay: Duration::from_millis(env_u64("PR_REVIEWER_PUBLISH_RETRY_BASE_MS", 1000)),
            attempt_timeout: Duration::from_secs(env_u64("PR_REVIEWER_PUBLISH_TIMEOUT_SECS", 30)),
        }
    }
}

/// Knobs for splitting and the analysis fan-out.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Size cap for one chunk, measured on raw patch bytes.
    pub max_chunk_bytes: usize,
    /// Above this file count the reference graph is skipped and the
    /// splitter degrades to one chunk per file.
    pub max_graph_files: usize,
    /// Files at or above this weight count as primary in their chunk.
    pub primary_weight_threshold: f32,
    /// Concurrent chunk analyses (semaphore permits).
    pub max_concurrent_analyses: usize,
    /// Analyzer retry policy.
    pub retry: RetryPolicy,
    /// Deadline for the whole Analyzing stage.
    pub stage_timeout: Duration,
}

impl OrchestratorConfig {
    /// Loads the config from env with production defaults.
    ///
    /// - `PR_REVIEWER_MAX_CHUNK_BYTES` (default 48000)
    /// - `PR_REVIEWER_MAX_GRAPH_FILES` (default 512)
    /// - `PR_REVIEWER_PRIMARY_WEIGHT` (default 3.0)
    /// - `PR_REVIEWER_MAX_CONCURRENCY` (default 4)
    /// - `PR_REVIEWER_STAGE_TIMEOUT_SECS` (default 300)
    pub fn from_env() -> Self {
        Self {
            max_chunk_bytes: env_usize("PR_REVIEWER_MAX_CHUNK_BYTES", 48_000),
            max_graph_files: env_usize("PR_REVIEWER_MAX_GRAPH_FILES", 512),
            primary_weight_threshold: env_f32("PR_REVIEWER_PRIMARY_WEIGHT", 3.0),
            max_concurrent_analyses: env_usize("PR_REVIEWER_MAX_CONCURRENCY", 4).max(1),
            retry: RetryPolicy::analyze_from_env(),
            stage_timeout: Duration::from_secs(env_u64("PR_REVIEWER_STAGE_TIMEOUT_SECS", 300)),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: 48_000,
            max_graph_files: 512,
            primary_weight_threshold: 3.0,
            max_concurrent_analyses: 4,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(2000),
                attempt_timeout: Duration::from_secs(60),
            },
            stage_timeout: Duration::from_secs(300),
        }
    }
}

/// Configuration for the publishing step.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// If false, skip publishing entirely (the run still succeeds).
    pub enabled: bool,
    /// If true, compute and log actions without calling the provider API.
    pub dry_run: bool,
    /// Hard cap on the posted comment body; longer bodies are truncated
    /// with a notice.
    pub max_comment_bytes: usize,
    /// Publisher retry policy.
    pub retry: RetryPolicy,
}

impl PublishConfig {
    /// Whether publishing will actually write to the provider API.
    pub fn requires_provider(&self) -> bool {
        self.enabled && !self.dry_run
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: env_bool("PR_REVIEWER_PUBLISH_ENABLED", true),
            dry_run: env_bool("PR_REVIEWER_PUBLISH_DRY_RUN", false),
            max_comment_bytes: env_usize("PR_REVIEWER_MAX_COMMENT_BYTES", 60_000),
            retry: RetryPolicy::publish_from_env(),
        }
    }
}

/// Configuration for the Slack notifier.
#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub bot_token: Option<String>,
    pub channel: Option<String>,
    /// Hard off-switch, `SLACK_NOTIFICATION=disable`.
    pub disabled: bool,
}

impl NotifyConfig {
    /// Loads Slack settings from env (`SLACK_BOT_TOKEN`, `SLACK_CHANNEL`,
    /// `SLACK_NOTIFICATION`).
    pub fn from_env() -> Self {
        let disabled = std::env::var("SLACK_NOTIFICATION")
            .map(|v| v.trim().eq_ignore_ascii_case("disable"))
            .unwrap_or(false);
        Self {
            bot_token: non_empty_env("SLACK_BOT_TOKEN"),
            channel: non_empty_env("SLACK_CHANNEL"),
            disabled,
        }
    }

    /// Notifications run only with a token, a channel and no off-switch.
    pub fn is_enabled(&self) -> bool {
        !self.disabled && self.bot_token.is_some() && self.channel.is_some()
    }
}

// ===== env helpers =====

pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

pub(crate) fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
