//! Markdown rendering for the aggregated review comment.
//!
//! One body serves every provider, so only portable markdown features are
//! used: headings, blockquotes, inline code, bullet lists.

use crate::model::{ChunkFinding, ChunkOutcome, ChunkResult, ReviewRequest, ReviewStats, Severity};

const SEVERITY_ORDER: [Severity; 4] = [
    Severity::Critical,
    Severity::Major,
    Severity::Minor,
    Severity::Normal,
];

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "\u{1F534}", // red circle
        Severity::Major => "\u{1F7E0}",    // orange circle
        Severity::Minor => "\u{1F7E1}",    // yellow circle
        Severity::Normal => "\u{26AA}",    // white circle
    }
}

/// Builds the review comment body for one execution.
pub fn render_review_body(
    request: &ReviewRequest,
    findings: &[ChunkFinding],
    failed: &[ChunkResult],
    stats: &ReviewStats,
    complete: bool,
) -> String {
    let mut out = String::new();

    out.push_str("## Automated code review\n\n");
    out.push_str(&format!(
        "**{}** #{}: {} (`{}` into `{}`)\n\n",
        request.repository,
        request.pr_number,
        request.title,
        request.source_branch,
        request.target_branch
    ));

    if !complete {
        let notes: Vec<String> = failed
            .iter()
            .filter_map(|r| match &r.outcome {
                ChunkOutcome::Failed { failure } => {
                    Some(format!("chunk {}: {}", r.seq, failure.kind))
                }
                ChunkOutcome::Ok { .. } => None,
            })
            .collect();
        out.push_str(&format!(
            "> \u{26A0}\u{FE0F} Partial review: {} of {} chunk(s) analyzed",
            stats.analyzed_chunks, stats.total_chunks
        ));
        if !notes.is_empty() {
            out.push_str(&format!(" ({})", notes.join(", ")));
        }
        out.push_str(". Findings below may be incomplete.\n\n");
    }

    if stats.total_chunks == 0 {
        out.push_str("_No reviewable changes in this pull request._\n");
        return out;
    }

    if findings.is_empty() {
        if complete {
            out.push_str("\u{2705} No issues found.\n");
        } else {
            out.push_str("_No findings from the analyzed chunks._\n");
        }
    } else {
        for severity in SEVERITY_ORDER {
            let in_bucket: Vec<&ChunkFinding> = findings
                .iter()
                .filter(|f| f.finding.severity == severity)
                .collect();
            if in_bucket.is_empty() {
                continue;
            }
            out.push_str(&format!(
                "### {} {} ({})\n\n",
                severity_marker(severity),
                severity,
                in_bucket.len()
            ));
            for entry in in_bucket {
                out.push_str(&render_finding(entry));
            }
            out.push('\n');
        }
    }

    out.push_str(&format!(
        "\n---\n_{} finding(s) across {} file(s) in {} chunk(s)._\n",
        stats.by_severity.total(),
        stats.files_total,
        stats.total_chunks
    ));

    out
}

fn render_finding(entry: &ChunkFinding) -> String {
    let f = &entry.finding;
    let location = match f.line {
        Some(line) => format!("`{}:{}`", f.path, line),
        None => format!("`{}`", f.path),
    };
    let mut line = format!("- {location}");
    if !f.category.is_empty() {
        line.push_str(&format!(" **{}**", f.category));
    }
    line.push_str(&format!(": {}\n", f.message.trim()));
    if let Some(suggestion) = &f.suggestion {
        line.push_str(&format!("  Suggestion: {}\n", suggestion.trim()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Finding, ProviderKind};

    fn request() -> ReviewRequest {
        ReviewRequest {
            provider: ProviderKind::GitHub,
            repository: "acme/widgets".into(),
            pr_number: 7,
            title: "Harden input parsing".into(),
            author: "dev".into(),
            source_branch: "fix/parsing".into(),
            target_branch: "main".into(),
            head_sha: Some("abc".into()),
            pr_url: None,
            diff: None,
        }
    }

    fn finding(severity: Severity, message: &str) -> ChunkFinding {
        ChunkFinding {
            chunk_seq: 0,
            finding: Finding {
                path: "src/lib.rs".into(),
                line: Some(10),
                severity,
                category: "security".into(),
                message: message.into(),
                suggestion: None,
            },
        }
    }

    #[test]
    fn clean_review_reports_no_issues() {
        let stats = ReviewStats {
            total_chunks: 2,
            analyzed_chunks: 2,
            files_total: 3,
            ..Default::default()
        };
        let body = render_review_body(&request(), &[], &[], &stats, true);
        assert!(body.contains("No issues found"));
        assert!(!body.contains("Partial review"));
    }

    #[test]
    fn findings_group_by_severity_in_ladder_order() {
        let findings = vec![
            finding(Severity::Minor, "prefer iterator"),
            finding(Severity::Critical, "sql injection"),
        ];
        let stats = ReviewStats {
            total_chunks: 1,
            analyzed_chunks: 1,
            files_total: 1,
            ..Default::default()
        };
        let body = render_review_body(&request(), &findings, &[], &stats, true);
        let critical_at = body.find("CRITICAL").unwrap();
        let minor_at = body.find("MINOR").unwrap();
        assert!(critical_at < minor_at);
        assert!(body.contains("`src/lib.rs:10`"));
        assert!(body.contains("**security**"));
    }

    #[test]
    fn empty_pull_request_is_called_out() {
        let body = render_review_body(&request(), &[], &[], &ReviewStats::default(), true);
        assert!(body.contains("No reviewable changes"));
    }
}
