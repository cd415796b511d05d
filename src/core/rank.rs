//! Personalized PageRank and rank redistribution.
//!
//! The ranking algorithm is a pluggable strategy behind [`RankingStrategy`]
//! so the power-iteration implementation can be swapped without touching
//! graph construction or the redistribution step. Node ranks are
//! redistributed across the `(definer_file, identifier)` pairs referenced
//! by each node's outgoing edges, then sorted into the total ordering the
//! budgeter consumes.
//!
//! Ties between equal floating-point scores compare exactly
//! (`f64::total_cmp`), then fall back to `(file, identifier)` lexical
//! order; no epsilon tolerance is applied.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use thiserror::Error;
use tracing::debug;

use crate::core::graph::{RefEdge, ReferenceGraph};

/// Ways the ranking computation can fail on degenerate input.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("graph has no nodes")]
    EmptyGraph,

    #[error("personalization vector sums to zero")]
    DegeneratePersonalization,

    #[error("power iteration did not converge after {0} iterations")]
    NonConvergence(usize),
}

/// Pluggable ranking seam: graph + optional personalization in, one score
/// per node (indexed by `NodeIndex`) out.
pub trait RankingStrategy {
    fn rank(
        &self,
        graph: &DiGraph<String, RefEdge>,
        personalization: Option<&BTreeMap<NodeIndex, f64>>,
    ) -> Result<Vec<f64>, RankError>;
}

/// Power-iteration personalized PageRank. Dangling-node mass is
/// redistributed along the personalization vector.
pub struct PersonalizedPageRank {
    pub damping: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for PersonalizedPageRank {
    fn default() -> Self {
        Self {
            damping: 0.85,
            tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

impl RankingStrategy for PersonalizedPageRank {
    fn rank(
        &self,
        graph: &DiGraph<String, RefEdge>,
        personalization: Option<&BTreeMap<NodeIndex, f64>>,
    ) -> Result<Vec<f64>, RankError> {
        let n = graph.node_count();
        if n == 0 {
            return Err(RankError::EmptyGraph);
        }

        // Normalized teleport distribution
        let p: Vec<f64> = match personalization {
            Some(map) => {
                let total: f64 = map.values().sum();
                if total <= 0.0 {
                    return Err(RankError::DegeneratePersonalization);
                }
                (0..n)
                    .map(|i| map.get(&NodeIndex::new(i)).copied().unwrap_or(0.0) / total)
                    .collect()
            }
            None => vec![1.0 / n as f64; n],
        };

        // Total outgoing weight per node; zero marks a dangling node
        let mut out_weight = vec![0.0f64; n];
        for edge in graph.edge_references() {
            out_weight[edge.source().index()] += edge.weight().weight;
        }

        let mut x = vec![1.0 / n as f64; n];

        for _ in 0..self.max_iterations {
            let mut next = vec![0.0f64; n];

            let dangling_mass: f64 = (0..n)
                .filter(|&i| out_weight[i] == 0.0)
                .map(|i| x[i])
                .sum();

            for edge in graph.edge_references() {
                let u = edge.source().index();
                let v = edge.target().index();
                next[v] += self.damping * x[u] * edge.weight().weight / out_weight[u];
            }

            for v in 0..n {
                next[v] += self.damping * dangling_mass * p[v] + (1.0 - self.damping) * p[v];
            }

            let err: f64 = next.iter().zip(&x).map(|(a, b)| (a - b).abs()).sum();
            x = next;

            if err < self.tolerance * n as f64 {
                return Ok(x);
            }
        }

        Err(RankError::NonConvergence(self.max_iterations))
    }
}

/// One entry of the total ordering: a `(file, identifier)` pair with its
/// accumulated score and the definition lines used for rendering, or a
/// bare file (no identifier) appended by raw node rank.
#[derive(Debug, Clone)]
pub struct RankedEntry {
    pub rel_fname: String,

    /// `None` for files appended without any ranked definition
    pub name: Option<String>,

    /// Zero-based definition lines; lexical-fallback lines (-1) excluded
    pub lines: Vec<i64>,

    pub score: f64,
}

/// Run the ranking strategy and produce the ordered entry list.
///
/// On a degenerate failure the computation is retried once without
/// personalization; if that also fails, an empty ranking is returned
/// rather than an error.
pub fn rank_entries(
    rg: &ReferenceGraph,
    active: &BTreeSet<String>,
    strategy: &dyn RankingStrategy,
) -> Vec<RankedEntry> {
    let pers: BTreeMap<NodeIndex, f64> = rg
        .personalization
        .iter()
        .filter_map(|(rel, score)| rg.nodes.get(rel).map(|idx| (*idx, *score)))
        .collect();

    let pers_arg = if pers.is_empty() { None } else { Some(&pers) };

    let ranks = match strategy.rank(&rg.graph, pers_arg) {
        Ok(r) => r,
        Err(e) => {
            debug!("ranking failed ({e}); retrying without personalization");
            match strategy.rank(&rg.graph, None) {
                Ok(r) => r,
                Err(e) => {
                    debug!("ranking failed again ({e}); returning empty ranking");
                    return Vec::new();
                }
            }
        }
    };

    // Redistribute each node's rank across its outgoing edges,
    // accumulating per (definer_file, identifier) pair.
    let mut ranked_definitions: BTreeMap<(String, String), f64> = BTreeMap::new();
    for (_, &u) in &rg.nodes {
        let total_out: f64 = rg.graph.edges(u).map(|e| e.weight().weight).sum();
        if total_out <= 0.0 {
            continue;
        }

        for edge in rg.graph.edges(u) {
            let definer = rg.graph[edge.target()].clone();
            let ident = edge.weight().ident.clone();
            let share = ranks[u.index()] * edge.weight().weight / total_out;
            *ranked_definitions.entry((definer, ident)).or_insert(0.0) += share;
        }
    }

    // Descending by score (exact comparison), then (file, ident) ascending
    let mut ordered: Vec<(&(String, String), f64)> = ranked_definitions
        .iter()
        .map(|(k, v)| (k, *v))
        .collect();
    ordered.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| a.0.0.cmp(&b.0.0))
            .then_with(|| a.0.1.cmp(&b.0.1))
    });

    let mut entries = Vec::new();
    let mut included_files: BTreeSet<&str> = BTreeSet::new();

    for ((fname, ident), score) in ordered {
        included_files.insert(fname);

        // Active files contributed to ranking upstream but are never
        // emitted; the caller already has their full content.
        if active.contains(fname) {
            continue;
        }

        let lines = rg
            .definitions
            .get(&(fname.clone(), ident.clone()))
            .map(|tags| tags.iter().map(|t| t.line).filter(|&l| l >= 0).collect())
            .unwrap_or_default();

        entries.push(RankedEntry {
            rel_fname: fname.clone(),
            name: Some(ident.clone()),
            lines,
            score,
        });
    }

    // Files that contributed no ranked definition are still listed,
    // ordered by their own raw PageRank score.
    let mut leftovers: Vec<(&String, f64)> = rg
        .nodes
        .iter()
        .filter(|(rel, _)| !included_files.contains(rel.as_str()) && !active.contains(*rel))
        .map(|(rel, idx)| (rel, ranks[idx.index()]))
        .collect();
    leftovers.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    for (rel, score) in leftovers {
        entries.push(RankedEntry {
            rel_fname: rel.clone(),
            name: None,
            lines: Vec::new(),
            score,
        });
    }

    entries
}
