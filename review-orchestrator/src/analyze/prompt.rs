//! Prompt construction for chunk analysis.
//!
//! Keep prompts compact; include the raw patches for model grounding plus a
//! cheap regex pre-scan whose hits are handed to the model as hints. The
//! output contract is strict JSON so the response parser stays dumb.

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::Chunk;
use crate::parser::looks_like_binary_patch;
use crate::split::weights::changed_line_bodies;

/// Language name for a changed path, by extension.
pub fn detect_language(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or_default();
    match ext {
        "py" => "Python",
        "js" => "JavaScript",
        "mjs" => "JavaScript",
        "ts" => "TypeScript",
        "jsx" => "React JSX",
        "tsx" => "React TSX",
        "java" => "Java",
        "kt" => "Kotlin",
        "go" => "Go",
        "rs" => "Rust",
        "rb" => "Ruby",
        "php" => "PHP",
        "c" => "C",
        "h" => "C header",
        "cpp" | "cc" | "cxx" => "C++",
        "hpp" => "C++ header",
        "cs" => "C#",
        "swift" => "Swift",
        "scala" => "Scala",
        "dart" => "Dart",
        "sh" | "bash" => "Shell",
        "sql" => "SQL",
        "html" => "HTML",
        "css" | "scss" => "CSS",
        "vue" => "Vue",
        "yml" | "yaml" => "YAML",
        "json" => "JSON",
        "toml" => "TOML",
        "md" => "Markdown",
        _ => "Unknown",
    }
}

lazy_static! {
    static ref SECURITY_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"\beval\s*\(").unwrap(),
        Regex::new(r"\bexec\s*\(").unwrap(),
        Regex::new(r"os\.system\s*\(|shell\s*=\s*True").unwrap(),
        Regex::new(r"pickle\.loads?\s*\(").unwrap(),
        Regex::new(r#"(?i)(password|passwd|secret|api_key|token)\s*=\s*["'][^"']+["']"#)
            .unwrap(),
        Regex::new(r"\bmd5\b|\bsha1\b").unwrap(),
        Regex::new(r"verify\s*=\s*False").unwrap(),
        Regex::new(r"dangerouslySetInnerHTML|\.innerHTML\s*=").unwrap(),
    ];
    static ref PERFORMANCE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)select\s+\*\s+from").unwrap(),
        Regex::new(r"(?:time|Thread)\.sleep\s*\(").unwrap(),
        Regex::new(r"for\s.+\bin\b.+\bfor\b.+\bin\b").unwrap(),
    ];
    static ref ERROR_PRONE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"except\s*:\s*(?:pass\s*)?$").unwrap(),
        Regex::new(r"catch\s*\(\s*\w*\s*\)\s*\{\s*\}").unwrap(),
        Regex::new(r"==\s*None\b|!=\s*None\b").unwrap(),
        Regex::new(r"\.unwrap\(\)").unwrap(),
        Regex::new(r"\bTODO\b|\bFIXME\b|\bHACK\b").unwrap(),
    ];
}

/// Max pre-scan hits kept per category.
const HITS_PER_CATEGORY: usize = 5;

/// Regex pre-scan results over a chunk's changed lines.
#[derive(Debug, Default)]
pub struct PatternHits {
    pub security: Vec<String>,
    pub performance: Vec<String>,
    pub error_prone: Vec<String>,
}

impl PatternHits {
    pub fn is_empty(&self) -> bool {
        self.security.is_empty() && self.performance.is_empty() && self.error_prone.is_empty()
    }
}

/// Scans a patch's changed lines against the pattern tables.
///
/// Hits are raw line bodies, trimmed, capped per category. These are hints
/// for the model, not findings; false positives are expected.
pub fn extract_pattern_hits(patch: &str) -> PatternHits {
    let mut hits = PatternHits::default();
    for body in changed_line_bodies(patch) {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            continue;
        }
        scan_into(&SECURITY_PATTERNS, trimmed, &mut hits.security);
        scan_into(&PERFORMANCE_PATTERNS, trimmed, &mut hits.performance);
        scan_into(&ERROR_PRONE_PATTERNS, trimmed, &mut hits.error_prone);
    }
    hits
}

fn scan_into(patterns: &[Regex], line: &str, out: &mut Vec<String>) {
    if out.len() >= HITS_PER_CATEGORY {
        return;
    }
    if patterns.iter().any(|p| p.is_match(line)) && !out.iter().any(|l| l == line) {
        out.push(line.to_string());
    }
}

/// Builds the analysis prompt for one chunk.
pub fn build_chunk_prompt(chunk: &Chunk, weight_threshold: f32) -> String {
    let primary = chunk.primary_paths(weight_threshold);

    let mut s = String::new();
    s.push_str("You are a code review assistant. Review the following pull request changes.\n");
    s.push_str("Focus on real defects: correctness, security, performance, error handling.\n");
    s.push_str("Do not comment on style unless it hides a bug.\n");

    s.push_str(&format!("\n# Changed files ({})\n", chunk.files.len()));
    for file in &chunk.files {
        let role = if primary.contains(&file.path.as_str()) {
            "primary"
        } else {
            "context"
        };
        s.push_str(&format!(
            "\n## {} ({}, {}, +{} -{})\n```diff\n",
            file.path,
            detect_language(&file.path),
            role,
            file.added_lines,
            file.removed_lines
        ));
        // Binary payloads carry nothing reviewable; keep the header only.
        if looks_like_binary_patch(&file.patch) {
            s.push_str("(binary file changed, content omitted)\n");
        } else {
            s.push_str(&file.patch);
            if !file.patch.ends_with('\n') {
                s.push('\n');
            }
        }
        s.push_str("```\n");
    }

    if !chunk.related_paths.is_empty() {
        s.push_str("\n# Related files changed elsewhere in this PR\n");
        for path in &chunk.related_paths {
            s.push_str(&format!("- {}\n", path));
        }
    }

    let mut hits = PatternHits::default();
    for file in &chunk.files {
        let file_hits = extract_pattern_hits(&file.patch);
        hits.security.extend(file_hits.security);
        hits.performance.extend(file_hits.performance);
        hits.error_prone.extend(file_hits.error_prone);
    }
    hits.security.truncate(HITS_PER_CATEGORY);
    hits.performance.truncate(HITS_PER_CATEGORY);
    hits.error_prone.truncate(HITS_PER_CATEGORY);

    if !hits.is_empty() {
        s.push_str("\n# Pre-scan hints (regex matches, verify before reporting)\n");
        for line in &hits.security {
            s.push_str(&format!("- security: `{}`\n", line));
        }
        for line in &hits.performance {
            s.push_str(&format!("- performance: `{}`\n", line));
        }
        for line in &hits.error_prone {
            s.push_str(&format!("- error-prone: `{}`\n", line));
        }
    }

    s.push_str("\n# Output format\n");
    s.push_str("Respond with strict JSON only, no markdown fences, no prose:\n");
    s.push_str(
        "{\"findings\":[{\"path\":\"<changed file>\",\"line\":<new-side line or null>,\
\"severity\":\"CRITICAL|MAJOR|MINOR|NORMAL\",\"category\":\"<short tag>\",\
\"message\":\"<what is wrong>\",\"suggestion\":\"<how to fix, optional>\"}]}\n",
    );
    s.push_str("- `path` must be one of the changed files listed above.\n");
    s.push_str("- Return {\"findings\":[]} when nothing is worth raising.\n");
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileDiff;

    fn chunk_with(patch: &str) -> Chunk {
        Chunk {
            seq: 0,
            files: vec![FileDiff {
                path: "src/auth.py".into(),
                patch: patch.into(),
                index: 0,
                added_lines: 1,
                removed_lines: 0,
                weight: 5.0,
            }],
            related_paths: vec!["src/models.py".into()],
        }
    }

    #[test]
    fn language_detection_covers_common_extensions() {
        assert_eq!(detect_language("src/x.py"), "Python");
        assert_eq!(detect_language("a/b/c.rs"), "Rust");
        assert_eq!(detect_language("web/app.tsx"), "React TSX");
        assert_eq!(detect_language("Makefile"), "Unknown");
    }

    #[test]
    fn pre_scan_flags_suspicious_lines() {
        let hits = extract_pattern_hits("+result = eval(user_input)\n+x = 1\n");
        assert_eq!(hits.security.len(), 1);
        assert!(hits.security[0].contains("eval"));
        assert!(hits.performance.is_empty());
    }

    #[test]
    fn pre_scan_caps_each_category() {
        let patch: String = (0..10).map(|i| format!("+eval(x{i})\n")).collect();
        let hits = extract_pattern_hits(&patch);
        assert_eq!(hits.security.len(), HITS_PER_CATEGORY);
    }

    #[test]
    fn prompt_carries_patch_hints_and_contract() {
        let chunk = chunk_with("+password = \"hunter2\"\n");
        let prompt = build_chunk_prompt(&chunk, 3.0);
        assert!(prompt.contains("## src/auth.py (Python, primary"));
        assert!(prompt.contains("password = \"hunter2\""));
        assert!(prompt.contains("# Pre-scan hints"));
        assert!(prompt.contains("- src/models.py"));
        assert!(prompt.contains("strict JSON"));
    }

    #[test]
    fn binary_patches_are_not_inlined() {
        let chunk = chunk_with(
            "diff --git a/logo.png b/logo.png\nBinary files a/logo.png and b/logo.png differ\n",
        );
        let prompt = build_chunk_prompt(&chunk, 3.0);
        assert!(prompt.contains("binary file changed, content omitted"));
        assert!(!prompt.contains("Binary files a/logo.png"));
    }
}
