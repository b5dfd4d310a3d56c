//! Stage 4: deterministic aggregation of chunk results.
//!
//! Pure with respect to its inputs: same results in any arrival order
//! produce byte-identical output.
//!
//! 1. Order results by chunk sequence; emission order within a chunk is
//!    already canonical.
//! 2. Drop exact duplicate findings, first occurrence wins.
//! 3. Mark the review complete only when every dispatched chunk came back
//!    `Ok`.
//! 4. Render the comment body, with a partial-review notice when chunks
//!    failed.

pub mod render;

use std::collections::HashSet;

use tracing::info;
use uuid::Uuid;

use crate::model::{
    AggregatedReview, Chunk, ChunkFinding, ChunkOutcome, ChunkResult, Finding, ReviewRequest,
    ReviewStats, SeverityCounts,
};

/// Merges all chunk results for one execution into the final review.
pub fn aggregate_results(
    request: &ReviewRequest,
    execution_id: Uuid,
    chunks: &[Chunk],
    mut results: Vec<ChunkResult>,
) -> AggregatedReview {
    results.sort_by_key(|r| r.seq);
    let results_total = results.len();

    let mut findings: Vec<ChunkFinding> = Vec::new();
    let mut failed: Vec<ChunkResult> = Vec::new();
    let mut seen: HashSet<Finding> = HashSet::new();
    let mut duplicates = 0usize;

    for result in results {
        match result.outcome {
            ChunkOutcome::Ok { findings: list } => {
                for finding in list {
                    if seen.insert(finding.clone()) {
                        findings.push(ChunkFinding {
                            chunk_seq: result.seq,
                            finding,
                        });
                    } else {
                        duplicates += 1;
                    }
                }
            }
            outcome @ ChunkOutcome::Failed { .. } => {
                failed.push(ChunkResult {
                    seq: result.seq,
                    outcome,
                });
            }
        }
    }

    // A missing result also voids completeness; the join barrier should
    // never let that happen, but the flag must not overstate coverage.
    let complete = failed.is_empty() && results_total == chunks.len();

    let mut by_severity = SeverityCounts::default();
    for entry in &findings {
        by_severity.bump(entry.finding.severity);
    }
    let max_severity = findings
        .iter()
        .map(|entry| entry.finding.severity)
        .max_by_key(|s| s.rank());

    let stats = ReviewStats {
        total_chunks: chunks.len() as u32,
        analyzed_chunks: (results_total - failed.len()) as u32,
        failed_chunks: failed.len() as u32,
        files_total: chunks.iter().map(|c| c.files.len() as u32).sum(),
        by_severity,
        max_severity,
    };

    let body_markdown = render::render_review_body(request, &findings, &failed, &stats, complete);

    info!(
        "stage4: aggregated findings={} duplicates_dropped={} failed_chunks={} complete={}",
        findings.len(),
        duplicates,
        failed.len(),
        complete
    );

    AggregatedReview {
        execution_id,
        complete,
        findings,
        failed_chunks: failed,
        stats,
        body_markdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChunkFailure, ChunkFailureKind, FileDiff, ProviderKind, Severity};

    fn request() -> ReviewRequest {
        ReviewRequest {
            provider: ProviderKind::GitLab,
            repository: "acme/widgets".into(),
            pr_number: 12,
            title: "Refactor cache".into(),
            author: "dev".into(),
            source_branch: "refactor/cache".into(),
            target_branch: "main".into(),
            head_sha: Some("abc".into()),
            pr_url: None,
            diff: None,
        }
    }

    fn chunk(seq: u32) -> Chunk {
        Chunk {
            seq,
            files: vec![FileDiff {
                path: format!("src/file{seq}.rs"),
                patch: "diff --git a/x b/x\n+line\n".into(),
                index: seq as usize,
                added_lines: 1,
                removed_lines: 0,
                weight: 0.1,
            }],
            related_paths: Vec::new(),
        }
    }

    fn finding(path: &str, line: u32, severity: Severity, message: &str) -> Finding {
        Finding {
            path: path.into(),
            line: Some(line),
            severity,
            category: "correctness".into(),
            message: message.into(),
            suggestion: None,
        }
    }

    fn timeout_failure(seq: u32) -> ChunkResult {
        ChunkResult::failed(
            seq,
            ChunkFailure {
                kind: ChunkFailureKind::Timeout,
                message: "attempt timed out".into(),
                attempts: 3,
            },
        )
    }

    #[test]
    fn output_is_independent_of_arrival_order() {
        let chunks = vec![chunk(0), chunk(1), chunk(2)];
        let id = Uuid::new_v4();
        let a = ChunkResult::ok(
            0,
            vec![finding("src/file0.rs", 1, Severity::Major, "first")],
        );
        let b = ChunkResult::ok(
            1,
            vec![finding("src/file1.rs", 2, Severity::Minor, "second")],
        );
        let c = ChunkResult::ok(
            2,
            vec![finding("src/file2.rs", 3, Severity::Normal, "third")],
        );

        let shuffled = aggregate_results(
            &request(),
            id,
            &chunks,
            vec![c.clone(), a.clone(), b.clone()],
        );
        let ordered = aggregate_results(&request(), id, &chunks, vec![a, b, c]);

        assert_eq!(shuffled, ordered);
        let seqs: Vec<u32> = shuffled.findings.iter().map(|f| f.chunk_seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn exact_duplicates_collapse_to_first_occurrence() {
        let chunks = vec![chunk(0), chunk(1)];
        let duplicate = finding("src/shared.rs", 5, Severity::Major, "leaked handle");
        let near_duplicate = finding("src/shared.rs", 6, Severity::Major, "leaked handle");

        let review = aggregate_results(
            &request(),
            Uuid::new_v4(),
            &chunks,
            vec![
                ChunkResult::ok(0, vec![duplicate.clone()]),
                ChunkResult::ok(1, vec![duplicate, near_duplicate]),
            ],
        );

        assert_eq!(review.findings.len(), 2);
        assert_eq!(review.findings[0].chunk_seq, 0);
        assert_eq!(review.findings[1].chunk_seq, 1);
        assert_eq!(review.findings[1].finding.line, Some(6));
    }

    #[test]
    fn failed_chunk_clears_complete_and_is_reported() {
        let chunks: Vec<Chunk> = (0..5).map(chunk).collect();
        let mut results: Vec<ChunkResult> = (0..5)
            .map(|seq| {
                ChunkResult::ok(
                    seq,
                    vec![finding(
                        &format!("src/file{seq}.rs"),
                        1,
                        Severity::Minor,
                        "note",
                    )],
                )
            })
            .collect();
        results[3] = timeout_failure(3);

        let review = aggregate_results(&request(), Uuid::new_v4(), &chunks, results);

        assert!(!review.complete);
        assert_eq!(review.stats.analyzed_chunks, 4);
        assert_eq!(review.stats.failed_chunks, 1);
        assert_eq!(review.findings.len(), 4);
        assert_eq!(review.failed_chunks.len(), 1);
        assert_eq!(review.failed_chunks[0].seq, 3);
        assert!(review.body_markdown.contains("Partial review"));
        assert!(review.body_markdown.contains("chunk 3: timeout"));
    }

    #[test]
    fn missing_result_voids_completeness() {
        let chunks = vec![chunk(0), chunk(1)];
        let review = aggregate_results(
            &request(),
            Uuid::new_v4(),
            &chunks,
            vec![ChunkResult::ok(0, Vec::new())],
        );
        assert!(!review.complete);
    }

    #[test]
    fn empty_execution_is_complete_with_empty_body_note() {
        let review = aggregate_results(&request(), Uuid::new_v4(), &[], Vec::new());
        assert!(review.complete);
        assert!(review.findings.is_empty());
        assert_eq!(review.stats.total_chunks, 0);
        assert!(review.body_markdown.contains("No reviewable changes"));
    }

    #[test]
    fn stats_track_severity_ladder() {
        let chunks = vec![chunk(0)];
        let review = aggregate_results(
            &request(),
            Uuid::new_v4(),
            &chunks,
            vec![ChunkResult::ok(
                0,
                vec![
                    finding("src/file0.rs", 1, Severity::Critical, "uaf"),
                    finding("src/file0.rs", 2, Severity::Minor, "style"),
                ],
            )],
        );

        assert_eq!(review.stats.by_severity.critical, 1);
        assert_eq!(review.stats.by_severity.minor, 1);
        assert_eq!(review.stats.max_severity, Some(Severity::Critical));
    }
}
