//! Core data model for review executions.
//!
//! Everything a run produces or consumes is plain serde-able data so
//! executions can be logged, inspected and replayed as JSON. Chunk-level
//! failures live here as data (`ChunkFailure`), not in the error hierarchy:
//! a failed chunk degrades completeness, it never aborts the run.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::InputError;

/// Hosting provider a review request originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    GitHub,
    GitLab,
    Bitbucket,
}

impl ProviderKind {
    /// Parses a provider name as found in webhook paths and env vars.
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            "bitbucket" => Ok(Self::Bitbucket),
            other => Err(InputError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Bitbucket => "bitbucket",
        };
        f.write_str(s)
    }
}

/// Normalized review request, provider specifics already flattened out.
///
/// `repository` is the provider-native identity: `owner/name` for GitHub and
/// Bitbucket (`workspace/slug`), the full project path for GitLab.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub provider: ProviderKind,
    pub repository: String,
    pub pr_number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub source_branch: String,
    #[serde(default)]
    pub target_branch: String,
    /// Head revision the review applies to. Drives the stable execution id.
    #[serde(default)]
    pub head_sha: Option<String>,
    /// Human-facing PR/MR URL for reports and notifications.
    #[serde(default)]
    pub pr_url: Option<String>,
    /// Inline unified diff. When absent the engine fetches it from the
    /// provider before splitting.
    #[serde(default)]
    pub diff: Option<String>,
}

impl ReviewRequest {
    /// Validates the request before the workflow starts.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.repository.trim().is_empty() {
            return Err(InputError::MissingRepository);
        }
        if self.pr_number == 0 {
            return Err(InputError::InvalidPrNumber(self.pr_number));
        }
        Ok(())
    }

    /// Stable execution id for this request.
    ///
    /// UUIDv5 over `provider:repository:pr:head_sha`, so a redelivered
    /// webhook for the same head revision maps to the same execution and the
    /// publisher's idempotency key stays put. Random v4 when the head SHA is
    /// unknown.
    pub fn execution_id(&self) -> Uuid {
        match self.head_sha.as_deref() {
            Some(sha) if !sha.trim().is_empty() => {
                let seed = format!(
                    "{}:{}:{}:{}",
                    self.provider, self.repository, self.pr_number, sha
                );
                Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes())
            }
            _ => Uuid::new_v4(),
        }
    }
}

/// One file's slice of the unified diff.
///
/// `patch` is a byte-for-byte slice of the input diff including the leading
/// `diff --git` line, so concatenating all slices in `index` order
/// reproduces the parsed portion of the input exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDiff {
    /// New-side path (old-side path for pure deletions).
    pub path: String,
    /// Raw patch text for this file.
    pub patch: String,
    /// First-appearance index in the input diff.
    pub index: usize,
    pub added_lines: u32,
    pub removed_lines: u32,
    /// Review weight, see the splitter's weighing rules.
    pub weight: f32,
}

impl FileDiff {
    pub fn changed_lines(&self) -> u32 {
        self.added_lines + self.removed_lines
    }
}

/// One unit of analysis: a set of related file diffs.
///
/// `seq` is the stable chunk id: the position in the splitter's output.
/// Same diff + same config always yields the same sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub seq: u32,
    pub files: Vec<FileDiff>,
    /// Paths from the same dependency component that landed in other
    /// chunks; handed to the analyzer as context, never analyzed here.
    #[serde(default)]
    pub related_paths: Vec<String>,
}

impl Chunk {
    pub fn patch_bytes(&self) -> usize {
        self.files.iter().map(|f| f.patch.len()).sum()
    }

    pub fn changed_lines(&self) -> u32 {
        self.files.iter().map(|f| f.changed_lines()).sum()
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    /// Primary files are the ones over the configured weight threshold;
    /// everything else is light companion context.
    pub fn primary_paths(&self, weight_threshold: f32) -> Vec<&str> {
        self.files
            .iter()
            .filter(|f| f.weight >= weight_threshold)
            .map(|f| f.path.as_str())
            .collect()
    }
}

/// Severity ladder for findings, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Normal,
}

impl Severity {
    /// Numeric rank, higher is more severe.
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 4,
            Self::Major => 3,
            Self::Minor => 2,
            Self::Normal => 1,
        }
    }

    /// Tolerant parse of analyzer output labels. Unknown labels map to
    /// `Normal` instead of failing the finding.
    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Self::Critical,
            "MAJOR" | "HIGH" => Self::Major,
            "MINOR" | "MEDIUM" | "LOW" => Self::Minor,
            _ => Self::Normal,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "CRITICAL",
            Self::Major => "MAJOR",
            Self::Minor => "MINOR",
            Self::Normal => "NORMAL",
        };
        f.write_str(s)
    }
}

/// One review finding emitted by the analyzer for a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Finding {
    pub path: String,
    #[serde(default)]
    pub line: Option<u32>,
    pub severity: Severity,
    #[serde(default)]
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// Why a chunk's analysis ended without findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkFailureKind {
    /// Attempt or stage deadline elapsed.
    Timeout,
    /// Model backend said HTTP 429.
    RateLimited,
    /// Transport-level failure (DNS/connect/reset).
    Transport,
    /// Model backend 5xx.
    Server,
    /// Model backend rejected the input (non-429 4xx).
    Rejected,
    /// Response was delivered but unusable.
    Invalid,
}

impl fmt::Display for ChunkFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Transport => "transport",
            Self::Server => "server",
            Self::Rejected => "rejected",
            Self::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// Terminal failure of one chunk's analysis, after retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub kind: ChunkFailureKind,
    pub message: String,
    /// Attempts actually spent before giving up.
    pub attempts: u32,
}

/// Exactly one of these reaches the join barrier per dispatched chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub seq: u32,
    #[serde(flatten)]
    pub outcome: ChunkOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkOutcome {
    Ok { findings: Vec<Finding> },
    Failed { failure: ChunkFailure },
}

impl ChunkResult {
    pub fn ok(seq: u32, findings: Vec<Finding>) -> Self {
        Self {
            seq,
            outcome: ChunkOutcome::Ok { findings },
        }
    }

    pub fn failed(seq: u32, failure: ChunkFailure) -> Self {
        Self {
            seq,
            outcome: ChunkOutcome::Failed { failure },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, ChunkOutcome::Ok { .. })
    }
}

/// A finding tagged with the chunk it came from, in canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFinding {
    pub chunk_seq: u32,
    #[serde(flatten)]
    pub finding: Finding,
}

/// Per-severity counters for the aggregated review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u32,
    pub major: u32,
    pub minor: u32,
    pub normal: u32,
}

impl SeverityCounts {
    pub fn bump(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Major => self.major += 1,
            Severity::Minor => self.minor += 1,
            Severity::Normal => self.normal += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.critical + self.major + self.minor + self.normal
    }
}

/// Summary numbers for reports and notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    pub total_chunks: u32,
    pub analyzed_chunks: u32,
    pub failed_chunks: u32,
    pub files_total: u32,
    pub by_severity: SeverityCounts,
    pub max_severity: Option<Severity>,
}

/// Deterministic merge of all chunk results for one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReview {
    pub execution_id: Uuid,
    /// True only when every dispatched chunk came back `Ok`.
    pub complete: bool,
    /// Findings in canonical order: chunk seq, then emission order.
    pub findings: Vec<ChunkFinding>,
    /// Chunks that ended in failure, in seq order.
    pub failed_chunks: Vec<ChunkResult>,
    pub stats: ReviewStats,
    /// Rendered review comment body.
    pub body_markdown: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(sha: Option<&str>) -> ReviewRequest {
        ReviewRequest {
            provider: ProviderKind::GitLab,
            repository: "group/tool".into(),
            pr_number: 42,
            title: "Add retry".into(),
            author: "dev".into(),
            source_branch: "feature/retry".into(),
            target_branch: "main".into(),
            head_sha: sha.map(String::from),
            pr_url: None,
            diff: None,
        }
    }

    #[test]
    fn execution_id_is_stable_per_head_revision() {
        let a = request(Some("abc123")).execution_id();
        let b = request(Some("abc123")).execution_id();
        assert_eq!(a, b);

        let c = request(Some("def456")).execution_id();
        assert_ne!(a, c);
    }

    #[test]
    fn execution_id_without_sha_is_random() {
        let a = request(None).execution_id();
        let b = request(None).execution_id();
        assert_ne!(a, b);
    }

    #[test]
    fn validate_rejects_bad_requests() {
        let mut req = request(None);
        req.repository = "  ".into();
        assert!(req.validate().is_err());

        let mut req = request(None);
        req.pr_number = 0;
        assert!(req.validate().is_err());

        assert!(request(None).validate().is_ok());
    }

    #[test]
    fn severity_rank_orders_the_ladder() {
        assert!(Severity::Critical.rank() > Severity::Major.rank());
        assert!(Severity::Major.rank() > Severity::Minor.rank());
        assert!(Severity::Minor.rank() > Severity::Normal.rank());
    }

    #[test]
    fn severity_labels_parse_tolerantly() {
        assert_eq!(Severity::from_label("critical"), Severity::Critical);
        assert_eq!(Severity::from_label(" Major "), Severity::Major);
        assert_eq!(Severity::from_label("HIGH"), Severity::Major);
        assert_eq!(Severity::from_label("nonsense"), Severity::Normal);
    }
}
