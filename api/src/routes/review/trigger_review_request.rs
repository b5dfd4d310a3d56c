use review_orchestrator::ProviderKind;
use serde::Deserialize;

/// Request body for manually triggering a review.
///
/// This payload is sent by an operator or a CI job, not by a provider
/// webhook; the shared secret travels in the `X-Webhook-Secret` header.
#[derive(Debug, Deserialize)]
pub struct TriggerReviewRequest {
    /// Hosting provider of the repository.
    pub provider: ProviderKind,
    /// Provider-native repository identity ("owner/name" or the full
    /// GitLab project path).
    pub repository: String,
    /// Pull/merge request number.
    pub pr_number: u64,
    /// Head revision to review. Resolved from the provider when absent.
    #[serde(default)]
    pub head_sha: Option<String>,
    /// Inline unified diff, mainly for local runs without provider access.
    #[serde(default)]
    pub diff: Option<String>,
}
