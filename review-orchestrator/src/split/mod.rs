//! Stage 2: chunk splitting.
//!
//! Turns a unified diff into an ordered list of [`Chunk`]s:
//!
//! 1. Parse the diff into per-file patches (exact byte slices).
//! 2. Weigh each file for reviewer attention.
//! 3. Build the file reference graph and take connected components.
//! 4. Greedily bin-pack each component under the chunk size cap.
//!
//! The whole stage is synchronous and pure given (diff, config): same input
//! always produces the same chunk sequence. Graph failures never fail the
//! run; the splitter degrades to one chunk per file and reports it.

pub mod graph;
pub mod weights;

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::model::{Chunk, FileDiff};
use crate::parser;

/// Chunks going into a bin-packed component keep at most this many
/// cross-chunk companion paths as analyzer context.
const RELATED_PATHS_MAX: usize = 8;

/// Result of the splitting stage.
#[derive(Debug)]
pub struct SplitOutcome {
    pub chunks: Vec<Chunk>,
    /// True when the reference graph was skipped and chunking fell back to
    /// one file per chunk.
    pub degraded: bool,
}

/// Splits a unified diff into analysis chunks.
pub fn split_diff(diff: &str, cfg: &OrchestratorConfig) -> SplitOutcome {
    let t0 = Instant::now();
    let mut files = parser::parse_changed_files(diff);
    weights::assign_weights(&mut files);
    info!("stage2: split start files={}", files.len());

    if files.is_empty() {
        info!("stage2: split done chunks=0 (empty change set)");
        return SplitOutcome {
            chunks: Vec::new(),
            degraded: false,
        };
    }

    let (components, degraded) = match graph::build_file_graph(&files, cfg.max_graph_files) {
        Ok(g) => {
            debug!(
                "stage2: reference graph nodes={} edges={}",
                g.node_count(),
                g.edge_count()
            );
            (g.components(), false)
        }
        Err(e) => {
            warn!("stage2: split degraded to single-file chunks: {e}");
            ((0..files.len()).map(|i| vec![i]).collect(), true)
        }
    };

    let chunks = pack_components(files, components, cfg.max_chunk_bytes);
    info!(
        "stage2: split done chunks={} degraded={} in {} ms",
        chunks.len(),
        degraded,
        t0.elapsed().as_millis()
    );
    SplitOutcome { chunks, degraded }
}

/// Packs each component into chunks under `max_bytes` of patch text.
///
/// Files stay in input order; a component over the cap is cut greedily and
/// a single oversized file always gets its own chunk. Sibling chunks of the
/// same component reference each other through `related_paths`.
fn pack_components(
    files: Vec<FileDiff>,
    components: Vec<Vec<usize>>,
    max_bytes: usize,
) -> Vec<Chunk> {
    let mut slots: Vec<Option<FileDiff>> = files.into_iter().map(Some).collect();
    let mut chunks: Vec<Chunk> = Vec::new();

    for component in components {
        let mut bins: Vec<Vec<FileDiff>> = Vec::new();
        let mut cur: Vec<FileDiff> = Vec::new();
        let mut cur_bytes = 0usize;

        for i in component {
            let Some(file) = slots[i].take() else {
                continue;
            };
            if !cur.is_empty() && cur_bytes + file.patch.len() > max_bytes {
                bins.push(std::mem::take(&mut cur));
                cur_bytes = 0;
            }
            cur_bytes += file.patch.len();
            cur.push(file);
        }
        if !cur.is_empty() {
            bins.push(cur);
        }

        let sibling_paths: Vec<Vec<String>> = bins
            .iter()
            .map(|bin| bin.iter().map(|f| f.path.clone()).collect())
            .collect();

        for (bi, bin) in bins.into_iter().enumerate() {
            let related_paths: Vec<String> = if sibling_paths.len() > 1 {
                sibling_paths
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != bi)
                    .flat_map(|(_, paths)| paths.iter().cloned())
                    .take(RELATED_PATHS_MAX)
                    .collect()
            } else {
                Vec::new()
            };

            chunks.push(Chunk {
                seq: chunks.len() as u32,
                files: bin,
                related_paths,
            });
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> OrchestratorConfig {
        OrchestratorConfig::default()
    }

    fn related_diff() -> String {
        "\
diff --git a/src/handlers.py b/src/handlers.py
--- a/src/handlers.py
+++ b/src/handlers.py
@@ -1,2 +1,3 @@
 import os
+from models import User
 def handle(): pass
diff --git a/src/models.py b/src/models.py
--- a/src/models.py
+++ b/src/models.py
@@ -1 +1,2 @@
 registry = {}
+class User: pass
diff --git a/docs/notes.md b/docs/notes.md
--- a/docs/notes.md
+++ b/docs/notes.md
@@ -1 +1,2 @@
 # notes
+more notes
"
        .to_string()
    }

    #[test]
    fn split_is_deterministic() {
        let diff = related_diff();
        let a = split_diff(&diff, &cfg());
        let b = split_diff(&diff, &cfg());
        assert_eq!(a.chunks, b.chunks);
        assert!(!a.degraded);
    }

    #[test]
    fn chunks_are_a_disjoint_union_of_the_change_set() {
        let diff = related_diff();
        let outcome = split_diff(&diff, &cfg());

        let mut paths: Vec<&str> = outcome
            .chunks
            .iter()
            .flat_map(|c| c.files.iter().map(|f| f.path.as_str()))
            .collect();
        paths.sort_unstable();
        assert_eq!(paths, vec!["docs/notes.md", "src/handlers.py", "src/models.py"]);

        let total_patch_bytes: usize = outcome
            .chunks
            .iter()
            .flat_map(|c| c.files.iter())
            .map(|f| f.patch.len())
            .sum();
        let parsed_bytes: usize = parser::parse_changed_files(&diff)
            .iter()
            .map(|f| f.patch.len())
            .sum();
        assert_eq!(total_patch_bytes, parsed_bytes);
    }

    #[test]
    fn related_files_share_a_chunk() {
        let outcome = split_diff(&related_diff(), &cfg());
        assert_eq!(outcome.chunks.len(), 2);

        let first = &outcome.chunks[0];
        assert!(first.contains_path("src/handlers.py"));
        assert!(first.contains_path("src/models.py"));
        assert_eq!(first.seq, 0);

        let second = &outcome.chunks[1];
        assert!(second.contains_path("docs/notes.md"));
        assert_eq!(second.seq, 1);
    }

    #[test]
    fn size_cap_packs_components_into_sibling_chunks() {
        let diff = related_diff();
        let mut small = cfg();
        // Force every file into its own bin.
        small.max_chunk_bytes = 1;

        let outcome = split_diff(&diff, &small);
        assert!(!outcome.degraded);
        assert_eq!(outcome.chunks.len(), 3);
        for chunk in &outcome.chunks {
            assert_eq!(chunk.files.len(), 1);
        }
        // The two-file component produces siblings that reference each other.
        assert_eq!(outcome.chunks[0].related_paths, vec!["src/models.py"]);
        assert_eq!(outcome.chunks[1].related_paths, vec!["src/handlers.py"]);
        assert!(outcome.chunks[2].related_paths.is_empty());
    }

    #[test]
    fn graph_failure_degrades_to_single_file_chunks() {
        let diff = related_diff();
        let mut guarded = cfg();
        guarded.max_graph_files = 1;

        let outcome = split_diff(&diff, &guarded);
        assert!(outcome.degraded);
        assert_eq!(outcome.chunks.len(), 3);
        for (i, chunk) in outcome.chunks.iter().enumerate() {
            assert_eq!(chunk.seq, i as u32);
            assert_eq!(chunk.files.len(), 1);
        }
    }

    #[test]
    fn empty_change_set_yields_zero_chunks() {
        let outcome = split_diff("", &cfg());
        assert!(outcome.chunks.is_empty());
        assert!(!outcome.degraded);
    }
}
