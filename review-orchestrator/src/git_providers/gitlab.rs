//! GitLab provider (REST v4) for MR metadata, diffs and notes.
//!
//! Endpoints used:
//! - GET  /projects/:id/merge_requests/:iid
//! - GET  /projects/:id/merge_requests/:iid/raw_diffs
//! - GET  /projects/:id/merge_requests/:iid/notes
//! - POST /projects/:id/merge_requests/:iid/notes
//! - PUT  /projects/:id/merge_requests/:iid/notes/:note_id

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::errors::PrResult;
use crate::git_providers::types::{ExistingComment, PrId, PrMeta};

#[derive(Debug, Clone)]
pub struct GitLabClient {
    http: Client,
    base_api: String, // e.g. "https://gitlab.com/api/v4"
    token: String,    // "PRIVATE-TOKEN"
}

impl GitLabClient {
    pub fn new(http: Client, base_api: String, token: String) -> Self {
        Self {
            http,
            base_api,
            token,
        }
    }

    /// Fetches MR metadata. `sha` is the MR head; `diff_refs` is the backup
    /// source when it is absent.
    pub async fn get_meta(&self, id: &PrId) -> PrResult<PrMeta> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}",
            self.base_api,
            urlencoding::encode(&id.repository),
            id.number
        );
        let resp: GitLabMr = self
            .http
            .get(url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let head_sha = resp.sha.or(resp.diff_refs.map(|r| r.head_sha));

        Ok(PrMeta {
            title: resp.title,
            author: resp.author.username,
            source_branch: resp.source_branch,
            target_branch: resp.target_branch,
            head_sha,
            web_url: Some(resp.web_url),
        })
    }

    /// Fetches the raw unified diff for the whole MR.
    pub async fn get_diff(&self, id: &PrId) -> PrResult<String> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}/raw_diffs",
            self.base_api,
            urlencoding::encode(&id.repository),
            id.number
        );
        let text = self
            .http
            .get(url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }

    /// Lists notes on the MR. System notes come back too; the caller only
    /// cares about marker-bearing bodies.
    pub async fn list_comments(&self, id: &PrId) -> PrResult<Vec<ExistingComment>> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}/notes?per_page=100",
            self.base_api,
            urlencoding::encode(&id.repository),
            id.number
        );
        let raw: Vec<GitLabNote> = self
            .http
            .get(url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(raw
            .into_iter()
            .map(|n| ExistingComment {
                id: n.id,
                body: n.body,
            })
            .collect())
    }

    pub async fn create_comment(&self, id: &PrId, body: &str) -> PrResult<u64> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}/notes",
            self.base_api,
            urlencoding::encode(&id.repository),
            id.number
        );
        let resp: GitLabNote = self
            .http
            .post(url)
            .header("PRIVATE-TOKEN", &self.token)
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
            "{}/projects/{}/merge_requests/{}/notes/{}",
            self.base_api,
            urlencoding::encode(&id.repository),
            id.number,
            comment_id
        );
        self.http
            .put(url)
            .header("PRIVATE-TOKEN", &self.token)
            .json(&json!({ "body": body }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// --- GitLab response shapes (subset of fields we actually use) ---

#[derive(Debug, Deserialize)]
struct GitLabMr {
    title: String,
    web_url: String,
    source_branch: String,
    target_branch: String,
    #[serde(default)]
    sha: Option<String>,
    #[serde(default)]
    diff_refs: Option<GitLabDiffRefs>,
    author: GitLabUser,
}

#[derive(Debug, Deserialize)]
struct GitLabDiffRefs {
    head_sha: String,
}

#[derive(Debug, Deserialize)]
struct GitLabUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct GitLabNote {
    id: u64,
    body: String,
}
