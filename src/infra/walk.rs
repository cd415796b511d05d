//! Gitignore-aware file walker used to gather the other-files set.
//!
//! Respects .gitignore, .git/info/exclude and the global gitignore, plus
//! extra ignore globs applied both as early directory pruning and as a
//! late file-level filter. Output is sorted for determinism.

use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};

pub struct FileWalker {
    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,

    /// Include hidden (dot) files; default false
    include_hidden: bool,
}

impl FileWalker {
    /// Build a walker with additional ignore patterns (e.g. "target/**").
    /// Patterns match on relative paths.
    pub fn new(additional_ignores: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();

        for pattern in additional_ignores {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            ignore_patterns: builder.build()?,
            include_hidden: false,
        })
    }

    /// Include or exclude hidden files (dotfiles).
    pub fn with_include_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    /// Traverse files under `root`, respecting ignore rules and extra
    /// globs. Returns a sorted list of absolute file paths.
    pub fn walk_files<P: AsRef<Path>>(&self, root: P) -> Vec<PathBuf> {
        let root_path = root.as_ref();

        let mut b = WalkBuilder::new(root_path);
        // WalkBuilder::hidden(true) means *skip* dotfiles
        b.hidden(!self.include_hidden);
        b.git_ignore(true);
        b.git_global(true);
        b.git_exclude(true);

        // Early directory pruning with the extra globs
        let extra = self.ignore_patterns.clone();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
            !(is_dir && extra.is_match(ent.path()))
        });

        let mut out: Vec<PathBuf> = b
            .build()
            .filter_map(|res| res.ok())
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(|abs| {
                let rel = abs.strip_prefix(root_path).unwrap_or(abs);
                !self.ignore_patterns.is_match(rel)
            })
            .collect();

        // Deterministic order (stable CLI & tests)
        out.sort();
        out
    }
}
