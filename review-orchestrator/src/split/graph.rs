//! Reference graph between changed files.
//!
//! Nodes are file paths, edges carry a relationship strength:
//!
//! - import/module reference in changed lines  +3.0
//! - similar basename (`user_service` vs `user_service_test`) +2.0
//! - same directory                            +1.0
//!
//! Unresolvable references are simply absent; the graph is best-effort.
//! Construction is guarded by `max_graph_files`: pairwise scanning is
//! quadratic, so oversized change sets degrade to single-file chunking at
//! the call site instead of stalling the run.

use std::collections::{HashMap, HashSet};

use petgraph::Undirected;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;

use crate::errors::SplitError;
use crate::model::FileDiff;
use crate::split::weights::changed_line_bodies;

/// Undirected file-relationship graph.
///
/// Node insertion order matches the input file order, so
/// `NodeIndex::index()` doubles as the index into the parsed file list.
#[derive(Debug)]
pub struct FileGraph {
    graph: Graph<String, f32, Undirected>,
}

impl FileGraph {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Connected components as file indices, each component and the list of
    /// components ordered by first appearance in the input.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut uf = UnionFind::<usize>::new(self.graph.node_count());
        for edge in self.graph.edge_references() {
            uf.union(edge.source().index(), edge.target().index());
        }

        let mut pos_by_root: HashMap<usize, usize> = HashMap::new();
        let mut components: Vec<Vec<usize>> = Vec::new();
        for idx in 0..self.graph.node_count() {
            let root = uf.find(idx);
            let pos = *pos_by_root.entry(root).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[pos].push(idx);
        }
        components
    }
}

/// Builds the reference graph for a parsed change set.
///
/// # Errors
/// [`SplitError::GraphTooLarge`] when the file count exceeds
/// `max_graph_files`; the caller falls back to single-file chunks.
pub fn build_file_graph(files: &[FileDiff], max_graph_files: usize) -> Result<FileGraph, SplitError> {
    if files.len() > max_graph_files {
        return Err(SplitError::GraphTooLarge {
            files: files.len(),
            max: max_graph_files,
        });
    }

    let mut graph = Graph::<String, f32, Undirected>::new_undirected();
    for file in files {
        graph.add_node(file.path.clone());
    }

    // Per-file token sets from changed import-looking lines.
    let import_tokens: Vec<HashSet<String>> =
        files.iter().map(|f| import_word_set(&f.patch)).collect();
    let stems: Vec<String> = files.iter().map(|f| path_stem(&f.path)).collect();
    let dirs: Vec<&str> = files.iter().map(|f| path_dir(&f.path)).collect();

    for a in 0..files.len() {
        for b in (a + 1)..files.len() {
            let mut strength = 0.0f32;

            if !dirs[a].is_empty() && dirs[a] == dirs[b] {
                strength += 1.0;
            }
            if similar_stems(&stems[a], &stems[b]) {
                strength += 2.0;
            }
            if import_tokens[a].contains(&stems[b]) || import_tokens[b].contains(&stems[a]) {
                strength += 3.0;
            }

            if strength > 0.0 {
                graph.add_edge(NodeIndex::new(a), NodeIndex::new(b), strength);
            }
        }
    }

    Ok(FileGraph { graph })
}

/// Basename without the last extension: `src/auth/models.py` → `models`.
fn path_stem(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base.to_string(),
    }
}

fn path_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    }
}

/// Equal stems, or the shorter one is a whole leading/trailing segment of
/// the longer (`user_service` / `user_service_test`). Plain substring
/// matching is too loose: `domain` must not pair with `main`.
fn similar_stems(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.len() < 4 {
        return false;
    }
    let bytes = long.as_bytes();
    if long.starts_with(short) && !bytes[short.len()].is_ascii_alphanumeric() {
        return true;
    }
    if long.ends_with(short) {
        let before = bytes[long.len() - short.len() - 1];
        return !before.is_ascii_alphanumeric();
    }
    false
}

/// Word set of all changed lines that look like imports.
fn import_word_set(patch: &str) -> HashSet<String> {
    use crate::split::weights::IMPORT_DECL;

    let mut words = HashSet::new();
    for body in changed_line_bodies(patch) {
        if !IMPORT_DECL.is_match(body) {
            continue;
        }
        for word in body.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
            if !word.is_empty() {
                words.insert(word.to_string());
            }
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, patch: &str, index: usize) -> FileDiff {
        FileDiff {
            path: path.into(),
            patch: patch.into(),
            index,
            added_lines: 0,
            removed_lines: 0,
            weight: 0.0,
        }
    }

    #[test]
    fn import_reference_connects_files() {
        let files = vec![
            file("src/handlers.py", "+from models import User\n", 0),
            file("src/models.py", "+class User:\n", 1),
            file("docs/notes.md", "+unrelated\n", 2),
        ];
        let graph = build_file_graph(&files, 512).expect("graph");
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 1);

        let comps = graph.components();
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0], vec![0, 1]);
        assert_eq!(comps[1], vec![2]);
    }

    #[test]
    fn components_keep_first_appearance_order() {
        let files = vec![
            file("a/one.rs", "+fn one() {}\n", 0),
            file("b/two.rs", "+fn two() {}\n", 1),
            file("a/three.rs", "+fn three() {}\n", 2),
        ];
        let graph = build_file_graph(&files, 512).expect("graph");
        let comps = graph.components();
        // one.rs and three.rs share a directory; two.rs stands alone, but
        // the first component still leads because one.rs appeared first.
        assert_eq!(comps, vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn oversized_change_set_is_refused() {
        let files: Vec<FileDiff> = (0..5)
            .map(|i| file(&format!("f{i}.rs"), "+x\n", i))
            .collect();
        let err = build_file_graph(&files, 4).unwrap_err();
        assert!(matches!(err, SplitError::GraphTooLarge { files: 5, max: 4 }));
    }

    #[test]
    fn stems_and_similarity() {
        assert_eq!(path_stem("src/auth/models.py"), "models");
        assert_eq!(path_stem("Makefile"), "Makefile");
        assert!(similar_stems("user_service", "user_service_test"));
        assert!(!similar_stems("main", "domain"));
    }
}
