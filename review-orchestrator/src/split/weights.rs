//! Review-weight scoring for changed files.
//!
//! Weight approximates how much reviewer attention a file needs and feeds
//! two decisions downstream: the primary/reference partition inside a chunk
//! and the bin-packing order tie-breaks. The scale:
//!
//! - each changed line       × 0.1
//! - each changed method     × 3.0
//! - each changed type decl  × 5.0
//! - each changed import     × 1.0
//!
//! Detection is plain regex over the changed lines only (added + removed),
//! which keeps the score independent of untouched context.

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::FileDiff;

lazy_static! {
    static ref METHOD_DECL: Regex =
        Regex::new(r"^\s*(?:pub\s+|public\s+|private\s+|protected\s+|static\s+|async\s+)*(?:def|fn|func|function)\s+\w+|^\s*(?:public|private|protected)\s+[\w<>\[\]]+\s+\w+\s*\(")
            .unwrap();
    static ref TYPE_DECL: Regex =
        Regex::new(r"^\s*(?:pub\s+|export\s+|abstract\s+|final\s+)*(?:class|interface|struct|enum|trait|impl)\s+\w+")
            .unwrap();
    pub(crate) static ref IMPORT_DECL: Regex =
        Regex::new(r#"^\s*(?:import\s|from\s+\S+\s+import\s|use\s|require\s*\(|include\s|using\s|#include\s)"#)
            .unwrap();
}

/// Fills in `weight` for every file from its own patch.
pub fn assign_weights(files: &mut [FileDiff]) {
    for file in files.iter_mut() {
        file.weight = weigh_patch(&file.patch);
    }
}

fn weigh_patch(patch: &str) -> f32 {
    let mut changed_lines = 0u32;
    let mut methods = 0u32;
    let mut types = 0u32;
    let mut imports = 0u32;

    for line in changed_line_bodies(patch) {
        changed_lines += 1;
        if METHOD_DECL.is_match(line) {
            methods += 1;
        }
        if TYPE_DECL.is_match(line) {
            types += 1;
        }
        if IMPORT_DECL.is_match(line) {
            imports += 1;
        }
    }

    changed_lines as f32 * 0.1 + methods as f32 * 3.0 + types as f32 * 5.0 + imports as f32 * 1.0
}

/// Yields the body (without the `+`/`-` prefix) of every changed line.
pub(crate) fn changed_line_bodies(patch: &str) -> impl Iterator<Item = &str> {
    patch.lines().filter_map(|line| {
        if line.starts_with("+++") || line.starts_with("---") || line.starts_with("\\ ") {
            return None;
        }
        line.strip_prefix('+').or_else(|| line.strip_prefix('-'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(patch: &str) -> FileDiff {
        FileDiff {
            path: "src/x.py".into(),
            patch: patch.into(),
            index: 0,
            added_lines: 0,
            removed_lines: 0,
            weight: 0.0,
        }
    }

    #[test]
    fn plain_lines_score_light() {
        let mut files = vec![file("+one\n+two\n+three\n")];
        assign_weights(&mut files);
        assert!((files[0].weight - 0.3).abs() < 1e-6);
    }

    #[test]
    fn declarations_dominate_the_score() {
        let patch = "\
+import os
+class Session:
+    def refresh(self):
+        return os.urandom(8)
";
        let mut files = vec![file(patch)];
        assign_weights(&mut files);
        // 4 lines * 0.1 + import 1.0 + class 5.0 + def 3.0
        assert!((files[0].weight - 9.4).abs() < 1e-6);
    }

    #[test]
    fn rust_and_js_declarations_are_seen() {
        assert!(METHOD_DECL.is_match("pub async fn run() {"));
        assert!(METHOD_DECL.is_match("function handle(req) {"));
        assert!(TYPE_DECL.is_match("pub struct Chunk {"));
        assert!(IMPORT_DECL.is_match("use std::time::Duration;"));
        assert!(IMPORT_DECL.is_match("from models import User"));
        assert!(!IMPORT_DECL.is_match("important_value = 1"));
    }
}
