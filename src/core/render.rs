//! Context-padded source excerpt rendering.
//!
//! Given a file and its lines of interest, renders the marked lines with a
//! few lines of surrounding context, eliding gaps. Rendered excerpts are
//! cached per (relative path, sorted lines, mtime) so the budget search
//! can re-probe prefixes without re-reading files.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use moka::sync::Cache;

use crate::infra::io::{mtime_ns, read_text};

/// Output lines longer than this are truncated; defends against
/// minified or generated files dominating the budget.
pub const MAX_RENDERED_LINE: usize = 100;

const GAP_MARKER: &str = "⋮...";
const LINE_PREFIX: char = '│';

type RenderKey = (PathBuf, Vec<i64>, u64);

/// Renders and caches per-file excerpts.
pub struct SnippetRenderer {
    /// Lines of context shown around each line of interest
    context_lines: usize,

    cache: Cache<RenderKey, String>,
}

impl SnippetRenderer {
    pub fn new(context_lines: usize) -> Self {
        Self {
            context_lines,
            cache: Cache::new(10_000),
        }
    }

    /// Render the excerpt for `abs` around `lines_of_interest`
    /// (zero-based). Negative lines (lexical-fallback tags) are ignored;
    /// an empty effective set renders as an empty string so callers can
    /// fall back to a bare file listing.
    pub fn render_excerpt(&self, rel: &Path, abs: &Path, lines_of_interest: &[i64]) -> String {
        let lois: Vec<i64> = lines_of_interest
            .iter()
            .copied()
            .filter(|&l| l >= 0)
            .sorted()
            .dedup()
            .collect();

        if lois.is_empty() {
            return String::new();
        }

        let mtime = mtime_ns(abs).unwrap_or(0);
        let key = (rel.to_path_buf(), lois.clone(), mtime);

        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        let rendered = self.build(abs, &lois);
        self.cache.insert(key, rendered.clone());
        rendered
    }

    fn build(&self, abs: &Path, lois: &[i64]) -> String {
        let Some(text) = read_text(abs) else {
            return String::new();
        };

        let lines: Vec<&str> = text.lines().collect();
        if lines.is_empty() {
            return String::new();
        }

        // Mark lines of interest plus surrounding context
        let mut shown: BTreeSet<usize> = BTreeSet::new();
        for &loi in lois {
            let loi = loi as usize;
            if loi >= lines.len() {
                continue;
            }
            let start = loi.saturating_sub(self.context_lines);
            let end = (loi + self.context_lines).min(lines.len() - 1);
            shown.extend(start..=end);
        }

        if shown.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        let mut prev: Option<usize> = None;

        for &i in &shown {
            match prev {
                None if i > 0 => {
                    out.push_str(GAP_MARKER);
                    out.push('\n');
                }
                Some(p) if i > p + 1 => {
                    out.push_str(GAP_MARKER);
                    out.push('\n');
                }
                _ => {}
            }

            out.push(LINE_PREFIX);
            out.push_str(&truncate_line(lines[i]));
            out.push('\n');

            prev = Some(i);
        }

        if shown.last().is_some_and(|&last| last + 1 < lines.len()) {
            out.push_str(GAP_MARKER);
            out.push('\n');
        }

        out
    }
}

/// Truncate one output line to [`MAX_RENDERED_LINE`] characters.
pub fn truncate_line(line: &str) -> String {
    if line.chars().count() <= MAX_RENDERED_LINE {
        line.to_string()
    } else {
        line.chars().take(MAX_RENDERED_LINE).collect()
    }
}
