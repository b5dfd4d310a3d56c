//! Unified-diff parser for the splitter.
//!
//! Stage 2 needs per-file patches whose concatenation reproduces the input
//! exactly, so chunks stay a disjoint union of the change set. This parser
//! therefore slices on `diff --git` boundaries instead of rebuilding text
//! from parsed hunks:
//! - each file's slice runs from its `diff --git` line up to the next one
//!   (or end of input), byte for byte;
//! - the new-side path comes from the `+++ b/...` header when present, with
//!   the old side for deletions and the `diff --git` line as last resort;
//! - added/removed counts skip the `+++`/`---` headers and `\ No newline`
//!   markers.
//!
//! Garbage input degrades to an empty file list, never an error; prelude
//! text before the first `diff --git` is not part of any file's change.

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::FileDiff;

lazy_static! {
    static ref DIFF_GIT_LINE: Regex = Regex::new(r"^diff --git a/(.+?) b/(.+)$").unwrap();
}

/// Splits a unified diff into per-file [`FileDiff`]s in first-appearance
/// order. Weights are left at zero; the splitter assigns them.
pub fn parse_changed_files(diff: &str) -> Vec<FileDiff> {
    let mut boundaries: Vec<usize> = Vec::new();
    let mut offset = 0usize;
    for line in diff.split_inclusive('\n') {
        if line.starts_with("diff --git ") {
            boundaries.push(offset);
        }
        offset += line.len();
    }

    let mut files = Vec::with_capacity(boundaries.len());
    for (idx, start) in boundaries.iter().copied().enumerate() {
        let end = boundaries.get(idx + 1).copied().unwrap_or(diff.len());
        let patch = &diff[start..end];

        let Some(path) = file_path(patch) else {
            continue;
        };

        let (added, removed) = count_changed_lines(patch);
        files.push(FileDiff {
            path,
            patch: patch.to_string(),
            index: idx,
            added_lines: added,
            removed_lines: removed,
            weight: 0.0,
        });
    }
    files
}

/// Extracts the file path for one patch slice.
///
/// Preference order: `+++ b/<path>` header, then the `diff --git` line's
/// b-side, then `--- a/<path>` for pure deletions (`+++ /dev/null`).
fn file_path(patch: &str) -> Option<String> {
    let mut from_git_line: Option<String> = None;
    let mut minus_path: Option<String> = None;

    for line in patch.lines() {
        if let Some(rest) = line.strip_prefix("+++ ") {
            let p = rest.trim();
            if p != "/dev/null" {
                return Some(strip_side_prefix(p).to_string());
            }
        } else if let Some(rest) = line.strip_prefix("--- ") {
            let p = rest.trim();
            if p != "/dev/null" && minus_path.is_none() {
                minus_path = Some(strip_side_prefix(p).to_string());
            }
        } else if line.starts_with("diff --git ") && from_git_line.is_none() {
            if let Some(caps) = DIFF_GIT_LINE.captures(line) {
                from_git_line = Some(caps[2].to_string());
            }
        }
    }

    // Deleted files have no usable +++ side.
    minus_path.or(from_git_line)
}

fn strip_side_prefix(p: &str) -> &str {
    p.strip_prefix("a/")
        .or_else(|| p.strip_prefix("b/"))
        .unwrap_or(p)
}

/// Counts added/removed lines, ignoring headers and `\ No newline` markers.
fn count_changed_lines(patch: &str) -> (u32, u32) {
    let mut added = 0u32;
    let mut removed = 0u32;
    for line in patch.lines() {
        if line.starts_with("+++") || line.starts_with("---") || line.starts_with("\\ ") {
            continue;
        }
        if line.starts_with('+') {
            added += 1;
        } else if line.starts_with('-') {
            removed += 1;
        }
    }
    (added, removed)
}

/// Heuristic for binary patches (`GIT binary patch` / `Binary files ... differ`).
pub fn looks_like_binary_patch(patch: &str) -> bool {
    patch
        .lines()
        .any(|l| l.starts_with("GIT binary patch") || l.starts_with("Binary files "))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FILES: &str = "\
diff --git a/src/auth.py b/src/auth.py
index 1111111..2222222 100644
--- a/src/auth.py
+++ b/src/auth.py
@@ -1,4 +1,5 @@
 import os
+import hmac
 def login():
-    return None
+    return hmac.new(b\"k\")
diff --git a/README.md b/README.md
index 3333333..4444444 100644
--- a/README.md
+++ b/README.md
@@ -1 +1,2 @@
 # tool
+auth docs
";

    #[test]
    fn slices_reproduce_the_input() {
        let files = parse_changed_files(TWO_FILES);
        assert_eq!(files.len(), 2);
        let rebuilt: String = files.iter().map(|f| f.patch.as_str()).collect();
        assert_eq!(rebuilt, TWO_FILES);
    }

    #[test]
    fn paths_and_counts() {
        let files = parse_changed_files(TWO_FILES);
        assert_eq!(files[0].path, "src/auth.py");
        assert_eq!(files[0].added_lines, 2);
        assert_eq!(files[0].removed_lines, 1);
        assert_eq!(files[1].path, "README.md");
        assert_eq!(files[1].added_lines, 1);
        assert_eq!(files[1].removed_lines, 0);
        assert_eq!(files[0].index, 0);
        assert_eq!(files[1].index, 1);
    }

    #[test]
    fn deleted_file_uses_old_side_path() {
        let diff = "\
diff --git a/old.txt b/old.txt
deleted file mode 100644
index 5555555..0000000
--- a/old.txt
+++ /dev/null
@@ -1,2 +0,0 @@
-first
-second
";
        let files = parse_changed_files(diff);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "old.txt");
        assert_eq!(files[0].removed_lines, 2);
        assert_eq!(files[0].added_lines, 0);
    }

    #[test]
    fn prelude_is_ignored_and_garbage_is_empty() {
        let with_prelude = format!("some cover letter\n\n{TWO_FILES}");
        let files = parse_changed_files(&with_prelude);
        assert_eq!(files.len(), 2);

        assert!(parse_changed_files("not a diff at all").is_empty());
        assert!(parse_changed_files("").is_empty());
    }

    #[test]
    fn binary_patch_detection() {
        let diff = "\
diff --git a/logo.png b/logo.png
index 6666666..7777777 100644
Binary files a/logo.png and b/logo.png differ
";
        let files = parse_changed_files(diff);
        assert_eq!(files.len(), 1);
        assert!(looks_like_binary_patch(&files[0].patch));
        assert_eq!(files[0].added_lines, 0);
    }
}
