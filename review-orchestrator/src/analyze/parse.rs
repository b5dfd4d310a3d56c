//! Analyzer response parsing.
//!
//! The model is asked for strict JSON but treated as if it rambles: fences
//! and prose around the first JSON object are stripped, field shapes are
//! coerced where cheap, and anything still unusable is reported as `None`
//! so the caller can salvage the chunk as "no findings" instead of failing
//! it.

use serde::Deserialize;
use tracing::debug;

use crate::model::{Chunk, Finding, Severity};

/// Remove any markdown fences and pre/post-text; extract the first JSON object.
/// This is deliberately tolerant: we accept `{...}` anywhere in the string.
pub fn sanitize_json_block(s: &str) -> String {
    let no_fence = s
        .replace("```json", "")
        .replace("```", "")
        .replace('\u{feff}', "") // BOM
        .trim()
        .to_string();

    if let (Some(start), Some(end)) = (no_fence.find('{'), no_fence.rfind('}')) {
        if start < end {
            let candidate = &no_fence[start..=end];
            if candidate.contains(':') {
                return candidate.to_string();
            }
        }
    }
    no_fence
}

/// Loose wire shape the model actually produces.
#[derive(Debug, Deserialize)]
struct RawFindings {
    #[serde(default)]
    findings: Vec<RawFinding>,
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    line: Option<serde_json::Value>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
}

/// Parses and normalizes the model output for one chunk.
///
/// Returns `None` when the payload is not JSON at all; the caller logs and
/// treats the chunk as clean. Individual findings are dropped when they
/// have no message or point at a file outside the chunk (unless the chunk
/// has exactly one file, which then absorbs them).
pub fn parse_findings(raw: &str, chunk: &Chunk) -> Option<Vec<Finding>> {
    let cleaned = sanitize_json_block(raw);
    let parsed: RawFindings = serde_json::from_str(&cleaned).ok()?;

    let single_path = (chunk.files.len() == 1).then(|| chunk.files[0].path.clone());
    let mut findings = Vec::with_capacity(parsed.findings.len());
    let mut dropped = 0usize;

    for raw in parsed.findings {
        let Some(message) = raw.message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty())
        else {
            dropped += 1;
            continue;
        };

        let path = match raw.path.filter(|p| chunk.contains_path(p)) {
            Some(p) => p,
            None => match &single_path {
                Some(p) => p.clone(),
                None => {
                    dropped += 1;
                    continue;
                }
            },
        };

        findings.push(Finding {
            path,
            line: coerce_line(raw.line),
            severity: raw
                .severity
                .map(|s| Severity::from_label(&s))
                .unwrap_or(Severity::Normal),
            category: raw
                .category
                .map(|c| c.trim().to_string())
                .unwrap_or_default(),
            message,
            suggestion: raw
                .suggestion
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        });
    }

    if dropped > 0 {
        debug!(
            "stage3: chunk {} dropped {} malformed finding(s)",
            chunk.seq, dropped
        );
    }
    Some(findings)
}

/// Line numbers arrive as numbers, numeric strings or garbage.
fn coerce_line(value: Option<serde_json::Value>) -> Option<u32> {
    match value? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
