//! Tag data model shared by the extraction, caching and ranking layers.
//!
//! A `Tag` records one occurrence of an identifier in a source file, either
//! as a definition site or as a reference. Tags are the only artifact that
//! survives a file between queries (via the on-disk tag cache), so the type
//! carries serde derives and a stable sort order.

use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Line value used for references recovered by the lexical fallback,
/// which cannot attribute a precise source line.
pub const UNKNOWN_LINE: i64 = -1;

/// Whether a tag marks where an identifier is defined or where it is used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    /// Definition site (function, class, type, module, ...)
    Definition,

    /// Reference site (call, attribute access, bare mention)
    Reference,
}

/// One recorded occurrence of an identifier in a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tag {
    /// Path relative to the engine root (what the map renders)
    pub rel_fname: PathBuf,

    /// Absolute path on disk (what the cache and renderer read)
    pub fname: PathBuf,

    /// Zero-based line of the occurrence; [`UNKNOWN_LINE`] for fallback refs
    pub line: i64,

    /// Identifier text
    pub name: String,

    /// Definition or reference
    pub kind: TagKind,
}

impl Tag {
    pub fn is_definition(&self) -> bool {
        self.kind == TagKind::Definition
    }

    pub fn is_reference(&self) -> bool {
        self.kind == TagKind::Reference
    }
}

// Name-like tokens for the lexical fallback scan.
static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("ident regex"));

/// Scan raw text for name-like tokens and emit one `Reference` tag per
/// token with an unknown line. Used when a grammar ships definition
/// queries but no reference queries.
pub fn lexical_reference_tags(rel_fname: &PathBuf, fname: &PathBuf, text: &str) -> Vec<Tag> {
    IDENT_RE
        .find_iter(text)
        .map(|m| Tag {
            rel_fname: rel_fname.clone(),
            fname: fname.clone(),
            line: UNKNOWN_LINE,
            name: m.as_str().to_string(),
            kind: TagKind::Reference,
        })
        .collect()
}

/// True when an identifier follows snake_case, kebab-case or camelCase
/// conventions and is at least 8 characters long. Longer, conventionally
/// named identifiers are assumed more meaningful than short generic ones.
pub fn is_long_conventional(name: &str) -> bool {
    if name.chars().count() < 8 {
        return false;
    }

    if name.contains('_') || name.contains('-') {
        return true;
    }

    // camelCase: a lowercase character immediately followed by uppercase
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() && prev_lower {
            return true;
        }
        prev_lower = ch.is_lowercase();
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conventional_name_detection() {
        // Long snake_case and camelCase qualify
        assert!(is_long_conventional("compute_total"));
        assert!(is_long_conventional("computeTotal"));
        assert!(is_long_conventional("kebab-cased"));

        // Too short, even with separators
        assert!(!is_long_conventional("_helper"));
        assert!(!is_long_conventional("a_b"));

        // Long but no convention markers
        assert!(!is_long_conventional("alllowercase"));
        assert!(!is_long_conventional("SCREAMING"));
    }

    #[test]
    fn lexical_fallback_emits_unknown_line_references() {
        let rel = PathBuf::from("a.py");
        let abs = PathBuf::from("/repo/a.py");
        let tags = lexical_reference_tags(&rel, &abs, "def foo(bar):\n    return bar + 1\n");

        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["def", "foo", "bar", "return", "bar"]);

        for t in &tags {
            assert_eq!(t.line, UNKNOWN_LINE);
            assert!(t.is_reference());
        }
    }
}
