//! GitHub provider (REST 2022-11-28) for PR metadata, diffs and comments.
//!
//! Endpoints used:
//! - GET   /repos/{owner}/{repo}/pulls/{number}            (meta; diff via Accept)
//! - GET   /repos/{owner}/{repo}/issues/{number}/comments  (top-level comments)
//! - POST  /repos/{owner}/{repo}/issues/{number}/comments
//! - PATCH /repos/{owner}/{repo}/issues/comments/{id}

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::errors::PrResult;
use crate::git_providers::types::{ExistingComment, PrId, PrMeta};

const API_VERSION: &str = "2022-11-28";
const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_DIFF: &str = "application/vnd.github.diff";

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_api: String, // e.g. "https://api.github.com"
    token: String,    // bearer PAT or app token
}

impl GitHubClient {
    pub fn new(http: Client, base_api: String, token: String) -> Self {
        Self {
            http,
            base_api,
            token,
        }
    }

    /// Fetches PR metadata (title, branches, head SHA).
    pub async fn get_meta(&self, id: &PrId) -> PrResult<PrMeta> {
        let url = format!(
            "{}/repos/{}/pulls/{}",
            self.base_api, id.repository, id.number
        );
        let resp: GitHubPr = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", ACCEPT_JSON)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(PrMeta {
            title: resp.title,
            author: resp.user.login,
            source_branch: resp.head.ref_name,
            target_branch: resp.base.ref_name,
            head_sha: Some(resp.head.sha),
            web_url: Some(resp.html_url),
        })
    }

    /// Fetches the full unified diff via the `.diff` media type.
    pub async fn get_diff(&self, id: &PrId) -> PrResult<String> {
        let url = format!(
            "{}/repos/{}/pulls/{}",
            self.base_api, id.repository, id.number
        );
        let text = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", ACCEPT_DIFF)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }

    /// Lists top-level (issue) comments on the PR.
    pub async fn list_comments(&self, id: &PrId) -> PrResult<Vec<ExistingComment>> {
        let url = format!(
            "{}/repos/{}/issues/{}/comments?per_page=100",
            self.base_api, id.repository, id.number
        );
        let raw: Vec<GitHubComment> = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", ACCEPT_JSON)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(raw
            .into_iter()
            .map(|c| ExistingComment {
                id: c.id,
                body: c.body.unwrap_or_default(),
            })
            .collect())
    }

    pub async fn create_comment(&self, id: &PrId, body: &str) -> PrResult<u64> {
        let url = format!(
            "{}/repos/{}/issues/{}/comments",
            self.base_api, id.repository, id.number
        );
        let resp: GitHubComment = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header("Accept", ACCEPT_JSON)
            .header("X-GitHub-Api-Version", API_VERSION)
            .json(&json!({ "body": body }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.id)
    }

    pub async fn update_comment(&self, id: &PrId, comment_id: u64, body: &str) -> PrResult<()> {
        let url = format!(
            "{}/repos/{}/issues/comments/{}",
            self.base_api, id.repository, comment_id
        );
        self.http
            .patch(url)
            .bearer_auth(&self.token)
            .header("Accept", ACCEPT_JSON)
            .header("X-GitHub-Api-Version", API_VERSION)
            .json(&json!({ "body": body }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// --- GitHub response shapes (subset of fields we actually use) ---

#[derive(Debug, Deserialize)]
struct GitHubPr {
    title: String,
    html_url: String,
    user: GitHubUser,
    head: GitHubRef,
    base: GitHubRef,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
    #[serde(default)]
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitHubComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
}
