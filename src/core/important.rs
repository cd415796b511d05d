//! "Always relevant" file predicate.
//!
//! Build manifests, lockfiles, CI configuration and licensing are worth
//! listing in a map even when no symbol points at them; the budgeter
//! prepends matching files ahead of the ranked entries.

use std::path::Path;

/// Root-level (or any-level) filenames that are always worth listing.
const IMPORTANT_NAMES: &[&str] = &[
    "Cargo.toml",
    "Cargo.lock",
    "pyproject.toml",
    "setup.py",
    "requirements.txt",
    "package.json",
    "package-lock.json",
    "tsconfig.json",
    "go.mod",
    "go.sum",
    "CMakeLists.txt",
    "Makefile",
    "Dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    ".gitlab-ci.yml",
    "README",
    "README.md",
    "README.rst",
    "LICENSE",
    "LICENSE.md",
    "LICENSE.txt",
    "CONTRIBUTING.md",
];

/// Directory prefixes whose contents are always worth listing.
const IMPORTANT_PREFIXES: &[&str] = &[".github/workflows/", ".circleci/"];

/// True when a relative path matches the always-relevant allow-list.
pub fn is_important(rel_path: &Path) -> bool {
    let normalized = rel_path.to_string_lossy().replace('\\', "/");

    if IMPORTANT_PREFIXES.iter().any(|p| normalized.starts_with(p)) {
        return true;
    }

    rel_path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| IMPORTANT_NAMES.contains(&name))
}
