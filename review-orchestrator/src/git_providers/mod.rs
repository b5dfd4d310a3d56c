//! Provider facade w/o async-trait or dynamic trait objects.
//!
//! We expose an enum `ProviderClient` with concrete implementations per
//! provider. This keeps async fns simple and avoids boxing futures.

pub mod types;
pub use types::*;

pub mod bitbucket;
pub mod github;
pub mod gitlab;

use crate::errors::{ConfigError, PrResult};
use crate::model::ProviderKind;

/// Runtime configuration for any provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// API base, e.g. "https://gitlab.com/api/v4" or "https://api.github.com"
    pub base_api: String,
    /// Access token for the provider (PAT or app token).
    pub token: String,
}

impl ProviderConfig {
    /// Reads the token and base URL for one provider from the environment.
    ///
    /// Token vars: `GITHUB_TOKEN` / `GITLAB_TOKEN` / `BITBUCKET_TOKEN`.
    /// Base overrides (self-hosted instances): `GITHUB_API_URL` /
    /// `GITLAB_API_URL` / `BITBUCKET_API_URL`.
    pub fn from_env(kind: ProviderKind) -> Result<Self, ConfigError> {
        let (token_var, base_var, default_base) = match kind {
            ProviderKind::GitHub => ("GITHUB_TOKEN", "GITHUB_API_URL", "https://api.github.com"),
            ProviderKind::GitLab => ("GITLAB_TOKEN", "GITLAB_API_URL", "https://gitlab.com/api/v4"),
            ProviderKind::Bitbucket => (
                "BITBUCKET_TOKEN",
                "BITBUCKET_API_URL",
                "https://api.bitbucket.org/2.0",
            ),
        };

        let token = std::env::var(token_var)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken(token_var))?;
        let base_api = std::env::var(base_var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default_base.to_string())
            .trim_end_matches('/')
            .to_string();
        if !base_api.starts_with("http://") && !base_api.starts_with("https://") {
            return Err(ConfigError::InvalidBaseUrl(base_api));
        }

        Ok(Self {
            kind,
            base_api,
            token,
        })
    }
}

/// Concrete provider client (enum-dispatch).
#[derive(Debug, Clone)]
pub enum ProviderClient {
    GitHub(github::GitHubClient),
    GitLab(gitlab::GitLabClient),
    Bitbucket(bitbucket::BitbucketClient),
}

impl ProviderClient {
    /// Constructs a concrete client from generic config.
    pub fn from_config(cfg: ProviderConfig) -> PrResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent("pr-reviewer/0.1")
            .build()?;
        Ok(match cfg.kind {
            ProviderKind::GitHub => {
                Self::GitHub(github::GitHubClient::new(client, cfg.base_api, cfg.token))
            }
            ProviderKind::GitLab => {
                Self::GitLab(gitlab::GitLabClient::new(client, cfg.base_api, cfg.token))
            }
            ProviderKind::Bitbucket => Self::Bitbucket(bitbucket::BitbucketClient::new(
                client,
                cfg.base_api,
                cfg.token,
            )),
        })
    }

    /// Shorthand: environment config for `kind`, then `from_config`.
    pub fn from_env(kind: ProviderKind) -> PrResult<Self> {
        Self::from_config(ProviderConfig::from_env(kind)?)
    }

    /// Fetch PR metadata (title, branches, head SHA).
    pub async fn fetch_meta(&self, id: &PrId) -> PrResult<PrMeta> {
        match self {
            Self::GitHub(c) => c.get_meta(id).await,
            Self::GitLab(c) => c.get_meta(id).await,
            Self::Bitbucket(c) => c.get_meta(id).await,
        }
    }

    /// Fetch the full unified diff text for a PR.
    pub async fn fetch_diff(&self, id: &PrId) -> PrResult<String> {
        match self {
            Self::GitHub(c) => c.get_diff(id).await,
            Self::GitLab(c) => c.get_diff(id).await,
            Self::Bitbucket(c) => c.get_diff(id).await,
        }
    }

    /// List existing top-level comments on the PR.
    pub async fn list_comments(&self, id: &PrId) -> PrResult<Vec<ExistingComment>> {
        match self {
            Self::GitHub(c) => c.list_comments(id).await,
            Self::GitLab(c) => c.list_comments(id).await,
            Self::Bitbucket(c) => c.list_comments(id).await,
        }
    }

    /// Create a new top-level comment; returns the provider comment id.
    pub async fn create_comment(&self, id: &PrId, body: &str) -> PrResult<u64> {
        match self {
            Self::GitHub(c) => c.create_comment(id, body).await,
            Self::GitLab(c) => c.create_comment(id, body).await,
            Self::Bitbucket(c) => c.create_comment(id, body).await,
        }
    }

    /// Replace the body of an existing comment.
    pub async fn update_comment(&self, id: &PrId, comment_id: u64, body: &str) -> PrResult<()> {
        match self {
            Self::GitHub(c) => c.update_comment(id, comment_id, body).await,
            Self::GitLab(c) => c.update_comment(id, comment_id, body).await,
            Self::Bitbucket(c) => c.update_comment(id, comment_id, body).await,
        }
    }
}
