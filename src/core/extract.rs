//! Structural tag extraction: one source file in, ordered tag list out.
//!
//! Uses the per-language grammar and capture query from the registry when
//! one exists, and degrades to a lexical word scan for references when the
//! grammar only ships definition captures. Extraction failures are never
//! fatal: unsupported, unreadable, or unparseable files yield an empty
//! list and at most one warning per file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::warn;
use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator};

use crate::core::tags::{Tag, TagKind, lexical_reference_tags};
use crate::infra::io::read_text;
use crate::parsers::registry::language_for;

const DEFINITION_PREFIX: &str = "name.definition.";
const REFERENCE_PREFIX: &str = "name.reference.";

/// Per-instance extractor with compiled-query and warned-file state.
/// Multiple engines (one per repository root) do not interfere.
pub struct TagExtractor {
    /// Compiled capture queries, one per language id, built on first use
    queries: HashMap<&'static str, Query>,

    /// Files we already warned about; quiets repeat failures
    warned: HashSet<PathBuf>,
}

impl Default for TagExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TagExtractor {
    pub fn new() -> Self {
        Self {
            queries: HashMap::new(),
            warned: HashSet::new(),
        }
    }

    /// Extract all definition and reference tags from one file.
    pub fn extract(&mut self, fname: &Path, rel_fname: &Path) -> Vec<Tag> {
        let Some(spec) = language_for(fname) else {
            return Vec::new();
        };

        let Some(text) = read_text(fname) else {
            self.warn_once(fname, "unreadable or binary file");
            return Vec::new();
        };

        // Compile the capture query once per language id
        if !self.queries.contains_key(spec.id) {
            match Query::new(&spec.language, spec.query) {
                Ok(q) => {
                    self.queries.insert(spec.id, q);
                }
                Err(e) => {
                    self.warn_once(fname, &format!("capture query failed to compile: {e}"));
                    return Vec::new();
                }
            }
        }

        let mut parser = Parser::new();
        if parser.set_language(&spec.language).is_err() {
            self.warn_once(fname, "grammar rejected by parser");
            return Vec::new();
        }

        let Some(tree) = parser.parse(&text, None) else {
            self.warn_once(fname, "parse failed");
            return Vec::new();
        };

        let query = &self.queries[spec.id];
        let bytes = text.as_bytes();
        let capture_names = query.capture_names();

        let mut tags = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, tree.root_node(), bytes);

        while let Some(m) = matches.next() {
            for cap in m.captures {
                let label = capture_names[cap.index as usize];

                let kind = if label.starts_with(DEFINITION_PREFIX) {
                    TagKind::Definition
                } else if label.starts_with(REFERENCE_PREFIX) {
                    TagKind::Reference
                } else {
                    continue;
                };

                let Ok(name) = cap.node.utf8_text(bytes) else {
                    continue;
                };

                tags.push(Tag {
                    rel_fname: rel_fname.to_path_buf(),
                    fname: fname.to_path_buf(),
                    line: cap.node.start_position().row as i64,
                    name: name.to_string(),
                    kind,
                });
            }
        }

        apply_reference_fallback(tags, rel_fname, fname, &text)
    }

    fn warn_once(&mut self, fname: &Path, reason: &str) {
        if self.warned.insert(fname.to_path_buf()) {
            warn!(file = %fname.display(), "skipping file: {reason}");
        }
    }
}

/// Fallback rule: if the capture pass found references, keep the result
/// as-is. If it found only definitions, recover references with a lexical
/// scan (some grammars ship rich definition queries but no reference
/// queries). If it found neither, return the list unchanged.
fn apply_reference_fallback(
    mut tags: Vec<Tag>,
    rel_fname: &Path,
    fname: &Path,
    text: &str,
) -> Vec<Tag> {
    let has_refs = tags.iter().any(Tag::is_reference);
    let has_defs = tags.iter().any(Tag::is_definition);

    if !has_refs && has_defs {
        tags.extend(lexical_reference_tags(
            &rel_fname.to_path_buf(),
            &fname.to_path_buf(),
            text,
        ));
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tags::UNKNOWN_LINE;

    fn write(dir: &tempfile::TempDir, rel: &str, content: &str) -> PathBuf {
        let p = dir.path().join(rel);
        std::fs::write(&p, content).unwrap();
        p
    }

    #[test]
    fn python_definitions_and_references() {
        let dir = tempfile::TempDir::new().unwrap();
        let abs = write(
            &dir,
            "a.py",
            "def compute_total(xs):\n    return sum(xs)\n\ncompute_total([1])\n",
        );

        let mut ex = TagExtractor::new();
        let tags = ex.extract(&abs, Path::new("a.py"));

        let defs: Vec<_> = tags.iter().filter(|t| t.is_definition()).collect();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "compute_total");
        assert_eq!(defs[0].line, 0);

        let refs: Vec<_> = tags
            .iter()
            .filter(|t| t.is_reference())
            .map(|t| t.name.as_str())
            .collect();
        assert!(refs.contains(&"sum"));
        assert!(refs.contains(&"compute_total"));
    }

    #[test]
    fn rust_definitions_and_references() {
        let dir = tempfile::TempDir::new().unwrap();
        let abs = write(
            &dir,
            "m.rs",
            "pub struct Widget;\n\npub fn build_widget() -> Widget {\n    helper()\n}\n",
        );

        let mut ex = TagExtractor::new();
        let tags = ex.extract(&abs, Path::new("m.rs"));

        assert!(
            tags.iter()
                .any(|t| t.is_definition() && t.name == "build_widget")
        );
        assert!(tags.iter().any(|t| t.is_definition() && t.name == "Widget"));
        assert!(tags.iter().any(|t| t.is_reference() && t.name == "helper"));
    }

    #[test]
    fn unsupported_and_missing_files_are_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let abs = write(&dir, "notes.txt", "plain text");

        let mut ex = TagExtractor::new();
        assert!(ex.extract(&abs, Path::new("notes.txt")).is_empty());
        assert!(
            ex.extract(&dir.path().join("gone.py"), Path::new("gone.py"))
                .is_empty()
        );
    }

    #[test]
    fn fallback_fills_references_when_only_definitions_exist() {
        let rel = Path::new("a.py");
        let abs = Path::new("/repo/a.py");

        let only_def = vec![Tag {
            rel_fname: rel.to_path_buf(),
            fname: abs.to_path_buf(),
            line: 0,
            name: "top".to_string(),
            kind: TagKind::Definition,
        }];

        let out = apply_reference_fallback(only_def, rel, abs, "top level");
        assert!(out.iter().any(|t| t.is_definition()));
        assert!(
            out.iter()
                .any(|t| t.is_reference() && t.line == UNKNOWN_LINE && t.name == "level")
        );

        // Nothing found at all stays empty
        let out = apply_reference_fallback(Vec::new(), rel, abs, "whatever text");
        assert!(out.is_empty());
    }
}
