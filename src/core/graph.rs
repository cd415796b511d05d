//! Reference graph construction.
//!
//! Consumes per-file tag lists (already in sorted-file order) and builds a
//! weighted directed multigraph whose nodes are relative file paths and
//! whose edges encode "file A references an identifier defined in file B",
//! plus the personalization vector consumed by the ranker.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::core::tags::{Tag, is_long_conventional};

/// Weight for definitions that are never referenced; keeps isolated
/// definitions weakly visible without inflating their importance.
pub const SELF_EDGE_WEIGHT: f64 = 0.1;

/// Boost for references originating from a file the caller already has
/// open; a strong relevance signal.
pub const ACTIVE_REFERENCER_BOOST: f64 = 50.0;

/// Boost for identifiers named in the query and for long, conventionally
/// named identifiers.
pub const IDENT_BOOST: f64 = 10.0;

/// Penalty for private-looking identifiers and for identifiers defined in
/// too many files to be discriminating.
pub const IDENT_PENALTY: f64 = 0.1;

/// Identifiers defined in more than this many files are considered generic.
pub const GENERIC_DEFINER_LIMIT: usize = 5;

/// Edge payload: transition weight and the identifier that produced it.
#[derive(Debug, Clone)]
pub struct RefEdge {
    pub weight: f64,
    pub ident: String,
}

/// The built multigraph plus everything the ranker needs alongside it.
pub struct ReferenceGraph {
    /// Directed multigraph; node payloads are relative file paths
    pub graph: DiGraph<String, RefEdge>,

    /// Stable file-path → node-index map (insertion order = sorted files)
    pub nodes: IndexMap<String, NodeIndex>,

    /// Sparse per-file bias for personalized PageRank
    pub personalization: BTreeMap<String, f64>,

    /// Definition tags per (file, identifier), kept for rendering
    pub definitions: BTreeMap<(String, String), Vec<Tag>>,
}

/// Builds a [`ReferenceGraph`] from per-file tags and query context.
pub struct GraphBuilder<'a> {
    active: &'a BTreeSet<String>,
    mentioned_files: &'a BTreeSet<String>,
    mentioned_idents: &'a BTreeSet<String>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        active: &'a BTreeSet<String>,
        mentioned_files: &'a BTreeSet<String>,
        mentioned_idents: &'a BTreeSet<String>,
    ) -> Self {
        Self {
            active,
            mentioned_files,
            mentioned_idents,
        }
    }

    /// Build the graph. `files` must be sorted by relative path; that
    /// ordering is what makes downstream scoring deterministic.
    pub fn build(&self, files: &[(String, Vec<Tag>)]) -> ReferenceGraph {
        let mut defines: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut references: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut definitions: BTreeMap<(String, String), Vec<Tag>> = BTreeMap::new();

        for (rel, tags) in files {
            for tag in tags {
                match tag.kind {
                    crate::core::tags::TagKind::Definition => {
                        defines.entry(&tag.name).or_default().insert(rel);
                        definitions
                            .entry((rel.clone(), tag.name.clone()))
                            .or_default()
                            .push(tag.clone());
                    }
                    crate::core::tags::TagKind::Reference => {
                        // List, not set: repeat references from the same
                        // file count multiple times
                        references.entry(&tag.name).or_default().push(rel);
                    }
                }
            }
        }

        // Degenerate fallback: when no references exist at all, treat the
        // definitions as references so the graph stays non-empty.
        if references.is_empty() {
            references = defines
                .iter()
                .map(|(ident, files)| (*ident, files.iter().copied().collect()))
                .collect();
        }

        let personalization = self.personalize(files);

        let mut graph: DiGraph<String, RefEdge> = DiGraph::new();
        let mut nodes: IndexMap<String, NodeIndex> = IndexMap::new();
        for (rel, _) in files {
            nodes
                .entry(rel.clone())
                .or_insert_with(|| graph.add_node(rel.clone()));
        }

        for (ident, definers) in &defines {
            let Some(referencers) = references.get(ident) else {
                // Defined but never referenced: one weak self-edge per
                // defining file
                for definer in definers {
                    let idx = nodes[*definer];
                    graph.add_edge(
                        idx,
                        idx,
                        RefEdge {
                            weight: SELF_EDGE_WEIGHT,
                            ident: (*ident).to_string(),
                        },
                    );
                }
                continue;
            };

            let mut mul = 1.0;
            if self.mentioned_idents.contains(*ident) {
                mul *= IDENT_BOOST;
            }
            if is_long_conventional(ident) {
                mul *= IDENT_BOOST;
            }
            if ident.starts_with('_') {
                mul *= IDENT_PENALTY;
            }
            if definers.len() > GENERIC_DEFINER_LIMIT {
                mul *= IDENT_PENALTY;
            }

            // Count repeat references per referencing file
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for referencer in referencers {
                *counts.entry(referencer).or_insert(0) += 1;
            }

            for (referencer, count) in counts {
                let mut use_mul = mul;
                if self.active.contains(referencer) {
                    use_mul *= ACTIVE_REFERENCER_BOOST;
                }

                // Square-root damping keeps one file with many repeated
                // mentions from dominating
                let weight = use_mul * (count as f64).sqrt();

                for definer in definers {
                    graph.add_edge(
                        nodes[referencer],
                        nodes[*definer],
                        RefEdge {
                            weight,
                            ident: (*ident).to_string(),
                        },
                    );
                }
            }
        }

        ReferenceGraph {
            graph,
            nodes,
            personalization,
            definitions,
        }
    }

    /// Personalization per spec: a uniform base of `100 / file_count` is
    /// added for active files, taken as a floor for mentioned files, and
    /// added again when a path component or stem matches a mentioned
    /// identifier. Only strictly positive scores are kept.
    fn personalize(&self, files: &[(String, Vec<Tag>)]) -> BTreeMap<String, f64> {
        let mut personalization = BTreeMap::new();
        if files.is_empty() {
            return personalization;
        }

        let base = 100.0 / files.len() as f64;

        for (rel, _) in files {
            let mut score = 0.0f64;

            if self.active.contains(rel) {
                score += base;
            }
            if self.mentioned_files.contains(rel) {
                score = score.max(base);
            }
            if self.path_matches_mentioned_ident(rel) {
                score += base;
            }

            if score > 0.0 {
                personalization.insert(rel.clone(), score);
            }
        }

        personalization
    }

    fn path_matches_mentioned_ident(&self, rel: &str) -> bool {
        let path = std::path::Path::new(rel);

        let component_match = path
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .any(|c| self.mentioned_idents.contains(c));

        let stem_match = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| self.mentioned_idents.contains(s));

        component_match || stem_match
    }
}
