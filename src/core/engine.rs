//! The map engine: ties extraction, ranking, rendering and budgeting
//! together behind one `compute` call, with a result cache governed by a
//! refresh policy.
//!
//! All state is per-instance; two engines over different repository roots
//! do not interfere. Per-file extraction may run in parallel, but results
//! are merged back in sorted-file order before graph construction so every
//! downstream score and tie-break stays deterministic.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use rayon::prelude::*;
use tracing::debug;

use crate::cli::{AppContext, ClearCacheArgs, MapArgs};
use crate::core::budgeter::{TokenCounter, find_best_prefix};
use crate::core::extract::TagExtractor;
use crate::core::graph::GraphBuilder;
use crate::core::important::is_important;
use crate::core::rank::{PersonalizedPageRank, RankedEntry, RankingStrategy, rank_entries};
use crate::core::render::{SnippetRenderer, truncate_line};
use crate::core::tag_cache::TagCache;
use crate::core::tags::Tag;
use crate::infra::config::load_config;
use crate::infra::walk::FileWalker;

/// Governs when a cached map result may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Never reuse; always recompute
    Always,

    /// Reuse whenever the file-set/token key matches, ignoring mention
    /// changes
    Files,

    /// Reuse only when the previous computation took longer than one
    /// second; the cache key includes mentions
    #[default]
    Auto,

    /// Always return the last computed result unless explicitly forced
    Manual,
}

impl std::str::FromStr for RefreshMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "always" => Ok(Self::Always),
            "files" => Ok(Self::Files),
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => anyhow::bail!(
                "unknown refresh mode '{other}' (expected always, files, auto or manual)"
            ),
        }
    }
}

/// Reuse threshold for [`RefreshMode::Auto`].
const AUTO_REFRESH_THRESHOLD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResultKey {
    active: Vec<PathBuf>,
    other: Vec<PathBuf>,
    max_tokens: usize,

    /// Present only in the mention-sensitive (`auto`) mode
    mentions: Option<(Vec<PathBuf>, Vec<String>)>,
}

/// Code-relevance map engine for one repository root.
pub struct RepoMap {
    root: PathBuf,
    refresh: RefreshMode,

    extractor: TagExtractor,
    tag_cache: TagCache,
    renderer: SnippetRenderer,
    counter: TokenCounter,
    strategy: Box<dyn RankingStrategy>,

    map_cache: HashMap<ResultKey, String>,
    last_map: Option<String>,
    map_processing_time: Duration,
}

impl RepoMap {
    /// Create an engine rooted at `root`. `model` selects the tokenizer
    /// ("gpt-4o", "cl100k_base", ...); `context_lines` pads excerpts.
    pub fn new(root: &Path, model: &str, refresh: RefreshMode, context_lines: usize) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            refresh,
            extractor: TagExtractor::new(),
            tag_cache: TagCache::open(root),
            renderer: SnippetRenderer::new(context_lines),
            counter: TokenCounter::new(model)?,
            strategy: Box::new(PersonalizedPageRank::default()),
            map_cache: HashMap::new(),
            last_map: None,
            map_processing_time: Duration::ZERO,
        })
    }

    /// Swap the ranking implementation (defaults to personalized
    /// PageRank).
    pub fn with_strategy(mut self, strategy: Box<dyn RankingStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Number of real tag extractions performed so far.
    pub fn extraction_count(&self) -> u64 {
        self.tag_cache.extraction_count()
    }

    /// Drop the persistent tag cache and all in-process result caches.
    pub fn clear_caches(&mut self) {
        self.tag_cache.clear();
        self.map_cache.clear();
        self.last_map = None;
    }

    /// Compute the budget-constrained map for the given query.
    ///
    /// Returns an empty string when either file set is empty or
    /// `max_tokens` is zero. Paths may be absolute or root-relative.
    pub fn compute(
        &mut self,
        active_files: &BTreeSet<PathBuf>,
        other_files: &BTreeSet<PathBuf>,
        max_tokens: usize,
        mentioned_files: &BTreeSet<PathBuf>,
        mentioned_idents: &BTreeSet<String>,
        force_refresh: bool,
    ) -> Result<String> {
        if active_files.is_empty() || other_files.is_empty() || max_tokens == 0 {
            return Ok(String::new());
        }

        if self.refresh == RefreshMode::Manual
            && !force_refresh
            && let Some(last) = &self.last_map
        {
            return Ok(last.clone());
        }

        let use_cache = match self.refresh {
            RefreshMode::Always | RefreshMode::Manual => false,
            RefreshMode::Files => true,
            RefreshMode::Auto => self.map_processing_time > AUTO_REFRESH_THRESHOLD,
        };

        let key = ResultKey {
            active: active_files.iter().cloned().collect(),
            other: other_files.iter().cloned().collect(),
            max_tokens,
            mentions: (self.refresh == RefreshMode::Auto).then(|| {
                (
                    mentioned_files.iter().cloned().collect(),
                    mentioned_idents.iter().cloned().collect(),
                )
            }),
        };

        if use_cache
            && !force_refresh
            && let Some(hit) = self.map_cache.get(&key)
        {
            debug!("serving map from result cache");
            return Ok(hit.clone());
        }

        let start = Instant::now();
        let map = self.compute_uncached(
            active_files,
            other_files,
            max_tokens,
            mentioned_files,
            mentioned_idents,
        )?;
        self.map_processing_time = start.elapsed();

        self.last_map = Some(map.clone());
        self.map_cache.insert(key, map.clone());
        Ok(map)
    }

    fn compute_uncached(
        &mut self,
        active_files: &BTreeSet<PathBuf>,
        other_files: &BTreeSet<PathBuf>,
        max_tokens: usize,
        mentioned_files: &BTreeSet<PathBuf>,
        mentioned_idents: &BTreeSet<String>,
    ) -> Result<String> {
        // Sorted union of both sets, keyed by relative path: this order is
        // what makes personalization and tie-breaking deterministic.
        let mut rel_to_abs: BTreeMap<String, PathBuf> = BTreeMap::new();
        for path in active_files.iter().chain(other_files) {
            rel_to_abs.insert(self.relative(path), self.absolute(path));
        }

        let active_rel: BTreeSet<String> =
            active_files.iter().map(|p| self.relative(p)).collect();
        let mentioned_rel: BTreeSet<String> =
            mentioned_files.iter().map(|p| self.relative(p)).collect();

        let files = self.collect_tags(&rel_to_abs);

        let builder = GraphBuilder::new(&active_rel, &mentioned_rel, mentioned_idents);
        let graph = builder.build(&files);

        let mut entries = rank_entries(&graph, &active_rel, self.strategy.as_ref());

        self.prepend_important(&mut entries, other_files, &active_rel);

        let renderer = &self.renderer;
        let counter = &self.counter;
        let map = find_best_prefix(counter, entries.len(), max_tokens, |n| {
            render_map(renderer, &entries[..n], &active_rel, &rel_to_abs)
        });

        Ok(map)
    }

    /// Fetch tags for every file through the cache. Cache misses are
    /// extracted in parallel and merged back in sorted-file order.
    fn collect_tags(&mut self, rel_to_abs: &BTreeMap<String, PathBuf>) -> Vec<(String, Vec<Tag>)> {
        let ordered: Vec<(&String, &PathBuf)> = rel_to_abs.iter().collect();

        let mut results: Vec<Option<Vec<Tag>>> = ordered
            .iter()
            .map(|(_, abs)| self.tag_cache.probe(abs))
            .collect();

        let misses: Vec<usize> = (0..ordered.len())
            .filter(|&i| results[i].is_none())
            .collect();

        let extracted: Vec<(usize, Vec<Tag>)> = if misses.len() > 1 {
            // One extractor per worker keeps compiled queries warm
            // across the files that worker processes
            misses
                .par_iter()
                .map_init(TagExtractor::new, |extractor, &i| {
                    let (rel, abs) = ordered[i];
                    (i, extractor.extract(abs, Path::new(rel)))
                })
                .collect()
        } else {
            misses
                .iter()
                .map(|&i| {
                    let (rel, abs) = ordered[i];
                    (i, self.extractor.extract(abs, Path::new(rel)))
                })
                .collect()
        };

        for (i, tags) in extracted {
            let (_, abs) = ordered[i];
            self.tag_cache.record(abs, tags.clone());
            results[i] = Some(tags);
        }

        ordered
            .into_iter()
            .zip(results)
            .map(|((rel, _), tags)| (rel.clone(), tags.unwrap_or_default()))
            .collect()
    }

    /// Prepend always-relevant files (manifests, CI config, ...) that the
    /// ranking did not surface, as bare file entries.
    fn prepend_important(
        &self,
        entries: &mut Vec<RankedEntry>,
        other_files: &BTreeSet<PathBuf>,
        active_rel: &BTreeSet<String>,
    ) {
        let present: BTreeSet<String> = entries.iter().map(|e| e.rel_fname.clone()).collect();

        let specials: Vec<RankedEntry> = other_files
            .iter()
            .map(|p| self.relative(p))
            .filter(|rel| {
                is_important(Path::new(rel))
                    && !present.contains(rel)
                    && !active_rel.contains(rel)
            })
            .sorted()
            .dedup()
            .map(|rel| RankedEntry {
                rel_fname: rel,
                name: None,
                lines: Vec::new(),
                score: 0.0,
            })
            .collect();

        entries.splice(0..0, specials);
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Render the first `entries` of the ranked list: grouped by file, active
/// files skipped, excerpts for entries with definition lines, bare
/// listings otherwise.
fn render_map(
    renderer: &SnippetRenderer,
    entries: &[RankedEntry],
    active_rel: &BTreeSet<String>,
    rel_to_abs: &BTreeMap<String, PathBuf>,
) -> String {
    let mut chosen: Vec<&RankedEntry> = entries
        .iter()
        .filter(|e| !active_rel.contains(&e.rel_fname))
        .collect();
    chosen.sort_by(|a, b| a.rel_fname.cmp(&b.rel_fname).then_with(|| a.name.cmp(&b.name)));

    let mut out = String::new();

    for (fname, group) in &chosen.iter().chunk_by(|e| e.rel_fname.clone()) {
        let lois: Vec<i64> = group.flat_map(|e| e.lines.iter().copied()).collect();

        let excerpt = if lois.is_empty() {
            String::new()
        } else {
            match rel_to_abs.get(&fname) {
                Some(abs) => renderer.render_excerpt(Path::new(&fname), abs, &lois),
                None => String::new(),
            }
        };

        if excerpt.is_empty() {
            out.push_str(&format!("\n{fname}\n"));
        } else {
            out.push_str(&format!("\n{fname}:\n"));
            out.push_str(&excerpt);
        }
    }

    if out.is_empty() {
        return out;
    }

    // Final safety pass over every output line, headers included
    let mut truncated: String = out.lines().map(truncate_line).join("\n");
    truncated.push('\n');
    truncated
}

/// CLI entry point for `repomap map`.
pub fn run(args: MapArgs, ctx: &AppContext) -> Result<()> {
    let cfg = load_config()?;

    let root = args
        .path
        .canonicalize()
        .with_context(|| format!("cannot resolve repository root {}", args.path.display()))?;

    if args.chat_files.is_empty() {
        anyhow::bail!("at least one --chat-file is required");
    }

    let resolve = |p: &PathBuf| -> PathBuf {
        if p.is_absolute() {
            p.clone()
        } else {
            root.join(p)
        }
    };

    let active_files: BTreeSet<PathBuf> = args.chat_files.iter().map(resolve).collect();
    for path in &active_files {
        if !path.is_file() {
            anyhow::bail!("chat file {} does not exist", path.display());
        }
    }

    let walker = FileWalker::new(&cfg.ignore_patterns)?;
    let other_files: BTreeSet<PathBuf> = walker
        .walk_files(&root)
        .into_iter()
        .filter(|p| !active_files.contains(p))
        .collect();

    let mentioned_files: BTreeSet<PathBuf> = args.mention_files.iter().map(resolve).collect();
    let mentioned_idents: BTreeSet<String> = args.mention_idents.iter().cloned().collect();

    let model = args.model.unwrap_or(cfg.map.model);
    let max_tokens = args.map_tokens.unwrap_or(cfg.map.max_tokens);
    let refresh: RefreshMode = match args.refresh {
        Some(arg) => arg.into(),
        None => cfg.map.refresh.parse()?,
    };

    let spinner = if ctx.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
        pb.set_message(format!("mapping {} files", other_files.len()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    };

    let mut engine = RepoMap::new(&root, &model, refresh, cfg.map.context_lines)?;
    let map = engine.compute(
        &active_files,
        &other_files,
        max_tokens,
        &mentioned_files,
        &mentioned_idents,
        args.force_refresh,
    )?;

    spinner.finish_and_clear();

    match args.output {
        Some(path) => {
            std::fs::write(&path, &map)
                .with_context(|| format!("cannot write map to {}", path.display()))?;
            if !ctx.quiet {
                println!("Wrote map to {}", path.display());
            }
        }
        None => print!("{map}"),
    }

    Ok(())
}

/// CLI entry point for `repomap clear-cache`.
pub fn clear_cache_run(args: ClearCacheArgs, ctx: &AppContext) -> Result<()> {
    let root = args
        .path
        .canonicalize()
        .with_context(|| format!("cannot resolve repository root {}", args.path.display()))?;

    let mut cache = TagCache::open(&root);
    cache.clear();

    if !ctx.quiet {
        println!("Cleared tag cache under {}", root.display());
    }
    Ok(())
}
