//! Bitbucket Cloud provider (REST 2.0) for PR metadata, diffs and comments.
//!
//! Endpoints used:
//! - GET  /repositories/{workspace}/{slug}/pullrequests/{id}
//! - GET  /repositories/{workspace}/{slug}/pullrequests/{id}/diff
//! - GET  /repositories/{workspace}/{slug}/pullrequests/{id}/comments
//! - POST /repositories/{workspace}/{slug}/pullrequests/{id}/comments
//! - PUT  /repositories/{workspace}/{slug}/pullrequests/{id}/comments/{cid}

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::errors::{Error, PrResult};
use crate::git_providers::types::{ExistingComment, PrId, PrMeta};

#[derive(Debug, Clone)]
pub struct BitbucketClient {
    http: Client,
    base_api: String, // e.g. "https://api.bitbucket.org/2.0"
    token: String,    // bearer access token
}

impl BitbucketClient {
    pub fn new(http: Client, base_api: String, token: String) -> Self {
        Self {
            http,
            base_api,
            token,
        }
    }

    fn pr_url(&self, id: &PrId) -> PrResult<String> {
        let (workspace, slug) = split_repo(&id.repository)?;
        Ok(format!(
            "{}/repositories/{}/{}/pullrequests/{}",
            self.base_api, workspace, slug, id.number
        ))
    }

    pub async fn get_meta(&self, id: &PrId) -> PrResult<PrMeta> {
        let resp: BitbucketPr = self
            .http
            .get(self.pr_url(id)?)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(PrMeta {
            title: resp.title,
            author: resp.author.and_then(|a| a.display_name).unwrap_or_default(),
            source_branch: resp.source.branch.name,
            target_branch: resp.destination.branch.name,
            head_sha: resp.source.commit.map(|c| c.hash),
            web_url: resp.links.and_then(|l| l.html).map(|h| h.href),
        })
    }

    pub async fn get_diff(&self, id: &PrId) -> PrResult<String> {
        let url = format!("{}/diff", self.pr_url(id)?);
        let text = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }

    pub async fn list_comments(&self, id: &PrId) -> PrResult<Vec<ExistingComment>> {
        let url = format!("{}/comments?pagelen=100", self.pr_url(id)?);
        let page: BitbucketPage<BitbucketComment> = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(page
            .values
            .into_iter()
            .map(|c| ExistingComment {
                id: c.id,
                body: c.content.map(|b| b.raw).unwrap_or_default(),
            })
            .collect())
    }

    pub async fn create_comment(&self, id: &PrId, body: &str) -> PrResult<u64> {
        let url = format!("{}/comments", self.pr_url(id)?);
        let resp: BitbucketComment = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({ "content": { "raw": body } }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.id)
    }

    pub async fn update_comment(&self, id: &PrId, comment_id: u64, body: &str) -> PrResult<()> {
        let url = format!("{}/comments/{}", self.pr_url(id)?, comment_id);
        self.http
            .put(url)
            .bearer_auth(&self.token)
            .json(&json!({ "content": { "raw": body } }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Splits "workspace/repo_slug" into its two path segments.
fn split_repo(repository: &str) -> PrResult<(&str, &str)> {
    repository
        .split_once('/')
        .filter(|(ws, slug)| !ws.is_empty() && !slug.is_empty())
        .ok_or_else(|| {
            Error::Validation(format!(
                "bitbucket repository must be workspace/repo_slug, got {repository:?}"
            ))
        })
}

/// --- Bitbucket response shapes (subset of fields we actually use) ---

#[derive(Debug, Deserialize)]
struct BitbucketPr {
    title: String,
    #[serde(default)]
    author: Option<BitbucketUser>,
    source: BitbucketEndpoint,
    destination: BitbucketEndpoint,
    #[serde(default)]
    links: Option<BitbucketLinks>,
}

#[derive(Debug, Deserialize)]
struct BitbucketUser {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BitbucketEndpoint {
    branch: BitbucketBranch,
    #[serde(default)]
    commit: Option<BitbucketCommit>,
}

#[derive(Debug, Deserialize)]
struct BitbucketBranch {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketCommit {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketLinks {
    #[serde(default)]
    html: Option<BitbucketHref>,
}

#[derive(Debug, Deserialize)]
struct BitbucketHref {
    href: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketPage<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct BitbucketComment {
    id: u64,
    #[serde(default)]
    content: Option<BitbucketCommentBody>,
}

#[derive(Debug, Deserialize)]
struct BitbucketCommentBody {
    raw: String,
}
