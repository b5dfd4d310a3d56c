//! Provider webhook payload normalization.
//!
//! Flattens the three provider payload shapes (GitHub `pull_request`,
//! GitLab `object_attributes`, Bitbucket `pullrequest`) into one
//! [`ReviewRequest`]. Events that are not a pull request being opened,
//! updated or reopened normalize to `None` and get acknowledged without
//! queueing a review.

use review_orchestrator::{ProviderKind, ReviewRequest};
use serde_json::Value;

/// Normalizes one raw webhook payload, `None` for ignorable events.
pub fn normalize(provider: ProviderKind, payload: &Value) -> Option<ReviewRequest> {
    match provider {
        ProviderKind::GitHub => normalize_github(payload),
        ProviderKind::GitLab => normalize_gitlab(payload),
        ProviderKind::Bitbucket => normalize_bitbucket(payload),
    }
}

fn normalize_github(payload: &Value) -> Option<ReviewRequest> {
    let action = payload.get("action")?.as_str()?;
    if !matches!(action, "opened" | "synchronize" | "reopened") {
        return None;
    }
    let pr = payload.get("pull_request")?;

    Some(ReviewRequest {
        provider: ProviderKind::GitHub,
        repository: str_at(payload, &["repository", "full_name"])?.to_string(),
        pr_number: pr.get("number")?.as_u64()?,
        title: owned_or_empty(str_at(pr, &["title"])),
        author: owned_or_empty(str_at(pr, &["user", "login"])),
        source_branch: owned_or_empty(str_at(pr, &["head", "ref"])),
        target_branch: owned_or_empty(str_at(pr, &["base", "ref"])),
        head_sha: str_at(pr, &["head", "sha"]).map(String::from),
        pr_url: str_at(pr, &["html_url"]).map(String::from),
        diff: None,
    })
}

fn normalize_gitlab(payload: &Value) -> Option<ReviewRequest> {
    if payload.get("object_kind")?.as_str()? != "merge_request" {
        return None;
    }
    let attrs = payload.get("object_attributes")?;
    // Manually re-fired hooks come without an action; treat them as "open".
    let action = attrs.get("action").and_then(Value::as_str).unwrap_or("open");
    if !matches!(action, "open" | "update" | "reopen") {
        return None;
    }

    Some(ReviewRequest {
        provider: ProviderKind::GitLab,
        repository: str_at(payload, &["project", "path_with_namespace"])?.to_string(),
        pr_number: attrs.get("iid")?.as_u64()?,
        title: owned_or_empty(str_at(attrs, &["title"])),
        author: owned_or_empty(str_at(payload, &["user", "username"])),
        source_branch: owned_or_empty(str_at(attrs, &["source_branch"])),
        target_branch: owned_or_empty(str_at(attrs, &["target_branch"])),
        head_sha: str_at(attrs, &["last_commit", "id"]).map(String::from),
        pr_url: str_at(attrs, &["url"]).map(String::from),
        diff: None,
    })
}

fn normalize_bitbucket(payload: &Value) -> Option<ReviewRequest> {
    let pr = payload.get("pullrequest")?;
    // Created/updated events carry state OPEN; merged/declined ones do not.
    if let Some(state) = pr.get("state").and_then(Value::as_str) {
        if !state.eq_ignore_ascii_case("open") {
            return None;
        }
    }

    Some(ReviewRequest {
        provider: ProviderKind::Bitbucket,
        repository: str_at(payload, &["repository", "full_name"])?.to_string(),
        pr_number: pr.get("id")?.as_u64()?,
        title: owned_or_empty(str_at(pr, &["title"])),
        author: owned_or_empty(str_at(pr, &["author", "display_name"])),
        source_branch: owned_or_empty(str_at(pr, &["source", "branch", "name"])),
        target_branch: owned_or_empty(str_at(pr, &["destination", "branch", "name"])),
        head_sha: str_at(pr, &["source", "commit", "hash"]).map(String::from),
        pr_url: str_at(pr, &["links", "html", "href"]).map(String::from),
        diff: None,
    })
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str()
}

fn owned_or_empty(s: Option<&str>) -> String {
    s.unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn github_pull_request_events_normalize() {
        let payload = json!({
            "action": "opened",
            "repository": { "full_name": "acme/tool" },
            "pull_request": {
                "number": 42,
                "title": "Add retry",
                "html_url": "https://github.com/acme/tool/pull/42",
                "user": { "login": "dev" },
                "head": { "ref": "feature/retry", "sha": "abc123" },
                "base": { "ref": "main" }
            }
        });

        let request = normalize(ProviderKind::GitHub, &payload).expect("pr event");
        assert_eq!(request.repository, "acme/tool");
        assert_eq!(request.pr_number, 42);
        assert_eq!(request.author, "dev");
        assert_eq!(request.source_branch, "feature/retry");
        assert_eq!(request.target_branch, "main");
        assert_eq!(request.head_sha.as_deref(), Some("abc123"));
        assert_eq!(
            request.pr_url.as_deref(),
            Some("https://github.com/acme/tool/pull/42")
        );
    }

    #[test]
    fn github_non_review_actions_are_ignored() {
        let closed = json!({
            "action": "closed",
            "repository": { "full_name": "acme/tool" },
            "pull_request": { "number": 42 }
        });
        assert!(normalize(ProviderKind::GitHub, &closed).is_none());

        let no_pr = json!({ "action": "opened", "zen": "Design for failure." });
        assert!(normalize(ProviderKind::GitHub, &no_pr).is_none());
    }

    #[test]
    fn gitlab_merge_request_events_normalize() {
        let payload = json!({
            "object_kind": "merge_request",
            "user": { "username": "dev" },
            "project": { "path_with_namespace": "group/tool" },
            "object_attributes": {
                "iid": 7,
                "title": "Add retry",
                "action": "update",
                "url": "https://gitlab.com/group/tool/-/merge_requests/7",
                "source_branch": "feature/retry",
                "target_branch": "main",
                "last_commit": { "id": "def456" }
            }
        });

        let request = normalize(ProviderKind::GitLab, &payload).expect("mr event");
        assert_eq!(request.repository, "group/tool");
        assert_eq!(request.pr_number, 7);
        assert_eq!(request.head_sha.as_deref(), Some("def456"));
    }

    #[test]
    fn gitlab_other_kinds_and_actions_are_ignored() {
        let push = json!({ "object_kind": "push" });
        assert!(normalize(ProviderKind::GitLab, &push).is_none());

        let merged = json!({
            "object_kind": "merge_request",
            "project": { "path_with_namespace": "group/tool" },
            "object_attributes": { "iid": 7, "action": "merge" }
        });
        assert!(normalize(ProviderKind::GitLab, &merged).is_none());
    }

    #[test]
    fn bitbucket_open_pull_requests_normalize() {
        let payload = json!({
            "repository": { "full_name": "team/tool" },
            "pullrequest": {
                "id": 3,
                "title": "Add retry",
                "state": "OPEN",
                "author": { "display_name": "Dev" },
                "source": {
                    "branch": { "name": "feature/retry" },
                    "commit": { "hash": "aa11bb2" }
                },
                "destination": { "branch": { "name": "main" } },
                "links": { "html": { "href": "https://bitbucket.org/team/tool/pull-requests/3" } }
            }
        });

        let request = normalize(ProviderKind::Bitbucket, &payload).expect("pr event");
        assert_eq!(request.repository, "team/tool");
        assert_eq!(request.pr_number, 3);
        assert_eq!(request.author, "Dev");
        assert_eq!(request.head_sha.as_deref(), Some("aa11bb2"));
    }

    #[test]
    fn bitbucket_non_open_states_are_ignored() {
        let merged = json!({
            "repository": { "full_name": "team/tool" },
            "pullrequest": { "id": 3, "state": "MERGED" }
        });
        assert!(normalize(ProviderKind::Bitbucket, &merged).is_none());
    }
}
