//! **repomap** - Code-relevance ranking and context budgeting for LLM workflows
//!
//! Extracts definition/reference symbols with tree-sitter, builds a weighted
//! reference graph, ranks it with personalized PageRank and renders the best
//! excerpts into a token-budgeted repository map.

/// Command-line interface with clap integration
pub mod cli;

/// Core pipeline - tags, graph, ranking, rendering and budgeting
pub mod core {
    /// Symbol tags, identifier scanning and the lexical reference fallback
    pub mod tags;
    pub use tags::{Tag, TagKind, UNKNOWN_LINE};

    /// Tree-sitter tag extraction driven by the language registry
    pub mod extract;
    pub use extract::TagExtractor;

    /// Persistent, mtime-validated tag cache with in-memory fallback
    pub mod tag_cache;
    pub use tag_cache::TagCache;

    /// Weighted reference graph and personalization vector
    pub mod graph;
    pub use graph::{GraphBuilder, ReferenceGraph};

    /// Personalized PageRank and rank-to-entry distribution
    pub mod rank;
    pub use rank::{PersonalizedPageRank, RankedEntry, RankingStrategy, rank_entries};

    /// Token counting, estimation and the budget binary search
    pub mod budgeter;
    pub use budgeter::{TokenCounter, find_best_prefix};

    /// Excerpt rendering with context padding and gap markers
    pub mod render;
    pub use render::SnippetRenderer;

    /// Always-relevant file predicate (manifests, CI config, ...)
    pub mod important;
    pub use important::is_important;

    /// The map engine: result cache, refresh policy and orchestration
    pub mod engine;
    pub use engine::{RefreshMode, RepoMap, clear_cache_run, run as map_run};
}

/// Language support - tree-sitter grammars and tag queries per language
pub mod parsers {
    /// Static registry mapping extensions to grammars and tag queries
    pub mod registry;
    pub use registry::{LanguageSpec, language_for};
}

/// Infrastructure - configuration, I/O and directory walking
pub mod infra {
    /// Configuration management with TOML support
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Text reading with memory mapping for large files
    pub mod io;
    pub use io::{mtime_ns, read_text};

    /// Gitignore-aware directory walking
    pub mod walk;
    pub use walk::FileWalker;
}

// Strategic re-exports for clean CLI and library use
pub use cli::{AppContext, Cli, Commands};
pub use core::{RefreshMode, RepoMap, Tag, TagKind};
pub use infra::{Config, FileWalker, load_config};
pub use parsers::language_for;
