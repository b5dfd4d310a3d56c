//! Provider-agnostic types for the PR surface we touch.
//!
//! Only the subset the pipeline needs: enough identity to address a pull
//! request, enough metadata to ingest a trigger-by-reference request, and
//! the comment shape the idempotent publisher scans.

use serde::{Deserialize, Serialize};

/// A unique reference to a pull request inside a provider.
///
/// * `repository` – GitLab: "group/project"; GitHub: "owner/repo";
///                  Bitbucket: "workspace/repo_slug".
/// * `number`     – GitLab MR IID or GitHub/Bitbucket PR number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrId {
    pub repository: String,
    pub number: u64,
}

impl PrId {
    pub fn new(repository: impl Into<String>, number: u64) -> Self {
        Self {
            repository: repository.into(),
            number,
        }
    }
}

/// Metadata subset used to complete a trigger-by-reference request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrMeta {
    pub title: String,
    pub author: String,
    pub source_branch: String,
    pub target_branch: String,
    pub head_sha: Option<String>,
    pub web_url: Option<String>,
}

/// One existing top-level comment on a PR. The publisher scans bodies for
/// its idempotency marker to decide update-vs-create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingComment {
    pub id: u64,
    pub body: String,
}
