//! Persistent, file-keyed cache of extracted tags.
//!
//! Entries are keyed by absolute path and validated against the file's
//! current modification time; any mismatch forces re-extraction and
//! overwrite. The backing store is a version-tagged directory of JSON
//! entries, so incompatible format changes bump the version and trigger a
//! full rebuild instead of silently reading stale data.
//!
//! A failing or corrupted store is never fatal: the cache attempts one
//! recovery pass (delete and recreate, then a write/read probe) and, if
//! that still fails, commits to an in-memory map for the rest of the
//! process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xxhash_rust::xxh64::xxh64;

use crate::core::extract::TagExtractor;
use crate::core::tags::Tag;
use crate::infra::io::mtime_ns;

/// Bumped on incompatible entry format changes.
pub const CACHE_VERSION: u32 = 1;

const PROBE_FILE: &str = ".probe";
const PROBE_PAYLOAD: &[u8] = b"repomap-cache-probe";

/// Directory name carrying the format version.
pub fn cache_dir_name() -> String {
    format!(".repomap.tags.cache.v{CACHE_VERSION}")
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// File modification time when the tags were extracted
    mtime_ns: u64,

    /// Extracted tags, in extraction order
    tags: Vec<Tag>,
}

enum Backing {
    /// Versioned on-disk directory of JSON entries
    Disk(PathBuf),

    /// Process-local fallback after a failed recovery pass
    Memory(HashMap<PathBuf, CacheEntry>),
}

/// Mtime-validated tag cache with a persistent backing store.
pub struct TagCache {
    backing: Backing,

    /// How many times the extractor was actually invoked; lets tests
    /// observe that cache hits skip re-extraction
    extractions: u64,
}

impl TagCache {
    /// Open (or create) the cache under `root`. Falls back to an
    /// in-memory map when the backing store cannot be made usable.
    pub fn open(root: &Path) -> Self {
        let dir = root.join(cache_dir_name());

        if probe_store(&dir) {
            return Self {
                backing: Backing::Disk(dir),
                extractions: 0,
            };
        }

        // Recovery pass: delete and recreate, then probe again
        let _ = std::fs::remove_dir_all(&dir);
        if probe_store(&dir) {
            debug!(dir = %dir.display(), "tag cache recovered after recreate");
            return Self {
                backing: Backing::Disk(dir),
                extractions: 0,
            };
        }

        warn!(
            dir = %dir.display(),
            "tag cache unusable; falling back to in-memory cache for this process"
        );
        Self {
            backing: Backing::Memory(HashMap::new()),
            extractions: 0,
        }
    }

    /// Tags for `fname`, served from cache when the stored modification
    /// time matches, re-extracted and stored otherwise.
    pub fn get(&mut self, extractor: &mut TagExtractor, fname: &Path, rel_fname: &Path) -> Vec<Tag> {
        let Some(mtime) = mtime_ns(fname) else {
            // Unstatable file: extraction handles the miss, nothing to cache
            return self.extract(extractor, fname, rel_fname);
        };

        if let Some(entry) = self.load(fname)
            && entry.mtime_ns == mtime
        {
            return entry.tags;
        }

        let tags = self.extract(extractor, fname, rel_fname);
        self.store(
            fname,
            CacheEntry {
                mtime_ns: mtime,
                tags: tags.clone(),
            },
        );
        tags
    }

    /// Cached tags for `fname` when the stored modification time still
    /// matches; `None` on a miss or stale entry. Read-only counterpart of
    /// [`TagCache::get`] for callers that extract misses themselves.
    pub fn probe(&self, fname: &Path) -> Option<Vec<Tag>> {
        let mtime = mtime_ns(fname)?;
        let entry = self.load(fname)?;
        (entry.mtime_ns == mtime).then_some(entry.tags)
    }

    /// Record externally extracted tags for `fname`, bumping the
    /// extraction counter.
    pub fn record(&mut self, fname: &Path, tags: Vec<Tag>) {
        self.extractions += 1;

        let Some(mtime) = mtime_ns(fname) else {
            return;
        };
        self.store(
            fname,
            CacheEntry {
                mtime_ns: mtime,
                tags,
            },
        );
    }

    /// Drop every cached entry. Disk-backed caches are recreated empty.
    pub fn clear(&mut self) {
        match &mut self.backing {
            Backing::Disk(dir) => {
                let _ = std::fs::remove_dir_all(&dir);
                if !probe_store(dir) {
                    warn!("tag cache clear left the store unusable; switching to memory");
                    self.backing = Backing::Memory(HashMap::new());
                }
            }
            Backing::Memory(map) => map.clear(),
        }
    }

    /// Number of real extractor invocations so far.
    pub fn extraction_count(&self) -> u64 {
        self.extractions
    }

    /// True when the persistent store failed and the cache degraded to
    /// process-local memory.
    pub fn is_memory_fallback(&self) -> bool {
        matches!(self.backing, Backing::Memory(_))
    }

    fn extract(&mut self, extractor: &mut TagExtractor, fname: &Path, rel_fname: &Path) -> Vec<Tag> {
        self.extractions += 1;
        extractor.extract(fname, rel_fname)
    }

    fn load(&self, fname: &Path) -> Option<CacheEntry> {
        match &self.backing {
            Backing::Disk(dir) => {
                let bytes = std::fs::read(entry_path(dir, fname)).ok()?;

                // Corrupt entries are treated as misses and overwritten
                serde_json::from_slice(&bytes).ok()
            }
            Backing::Memory(map) => {
                let e = map.get(fname)?;
                Some(CacheEntry {
                    mtime_ns: e.mtime_ns,
                    tags: e.tags.clone(),
                })
            }
        }
    }

    fn store(&mut self, fname: &Path, entry: CacheEntry) {
        match &mut self.backing {
            Backing::Disk(dir) => {
                let path = entry_path(dir, fname);
                let json = match serde_json::to_vec(&entry) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!("failed to serialize tag cache entry: {e}");
                        return;
                    }
                };

                if let Err(e) = std::fs::write(&path, json) {
                    // Store went bad mid-process: degrade to memory
                    warn!(
                        path = %path.display(),
                        "tag cache write failed ({e}); switching to in-memory cache"
                    );
                    let mut map = HashMap::new();
                    map.insert(fname.to_path_buf(), entry);
                    self.backing = Backing::Memory(map);
                }
            }
            Backing::Memory(map) => {
                map.insert(fname.to_path_buf(), entry);
            }
        }
    }
}

fn entry_path(dir: &Path, fname: &Path) -> PathBuf {
    let key = xxh64(fname.to_string_lossy().as_bytes(), 0);
    dir.join(format!("{key:016x}.json"))
}

/// Create the store directory and verify a write/read round-trip.
fn probe_store(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }

    let probe = dir.join(PROBE_FILE);
    if std::fs::write(&probe, PROBE_PAYLOAD).is_err() {
        return false;
    }

    let ok = std::fs::read(&probe).map(|b| b == PROBE_PAYLOAD).unwrap_or(false);
    let _ = std::fs::remove_file(&probe);
    ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let abs = dir.path().join("a.py");
        std::fs::write(&abs, "def compute_total(xs):\n    return sum(xs)\n").unwrap();
        (dir, abs, PathBuf::from("a.py"))
    }

    #[test]
    fn second_get_skips_extraction() {
        let (dir, abs, rel) = fixture();
        let mut cache = TagCache::open(dir.path());
        let mut ex = TagExtractor::new();

        let first = cache.get(&mut ex, &abs, &rel);
        assert_eq!(cache.extraction_count(), 1);

        let second = cache.get(&mut ex, &abs, &rel);
        assert_eq!(cache.extraction_count(), 1, "cache hit must not re-extract");
        assert_eq!(first, second);
    }

    #[test]
    fn mtime_mismatch_forces_reextraction() {
        let (dir, abs, rel) = fixture();
        let mut cache = TagCache::open(dir.path());
        let mut ex = TagExtractor::new();

        let _ = cache.get(&mut ex, &abs, &rel);
        assert_eq!(cache.extraction_count(), 1);

        // Simulate a stale entry without relying on filesystem mtime
        // granularity: rewrite the stored entry with a bogus mtime.
        let entry = entry_path(&dir.path().join(cache_dir_name()), &abs);
        let mut parsed: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&entry).unwrap()).unwrap();
        parsed["mtime_ns"] = serde_json::json!(1u64);
        std::fs::write(&entry, serde_json::to_vec(&parsed).unwrap()).unwrap();

        let tags = cache.get(&mut ex, &abs, &rel);
        assert_eq!(cache.extraction_count(), 2);
        assert!(tags.iter().any(|t| t.name == "compute_total"));
    }

    #[test]
    fn entries_survive_reopen() {
        let (dir, abs, rel) = fixture();

        {
            let mut cache = TagCache::open(dir.path());
            let mut ex = TagExtractor::new();
            let _ = cache.get(&mut ex, &abs, &rel);
        }

        // Fresh cache instance, same directory: no extraction needed
        let mut cache = TagCache::open(dir.path());
        let mut ex = TagExtractor::new();
        let tags = cache.get(&mut ex, &abs, &rel);
        assert_eq!(cache.extraction_count(), 0);
        assert!(tags.iter().any(|t| t.name == "compute_total"));
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let (dir, abs, rel) = fixture();
        let mut cache = TagCache::open(dir.path());
        let mut ex = TagExtractor::new();

        let _ = cache.get(&mut ex, &abs, &rel);
        let entry = entry_path(&dir.path().join(cache_dir_name()), &abs);
        std::fs::write(&entry, b"{not json").unwrap();

        let tags = cache.get(&mut ex, &abs, &rel);
        assert_eq!(cache.extraction_count(), 2);
        assert!(!tags.is_empty());
    }

    #[test]
    fn clear_drops_entries() {
        let (dir, abs, rel) = fixture();
        let mut cache = TagCache::open(dir.path());
        let mut ex = TagExtractor::new();

        let _ = cache.get(&mut ex, &abs, &rel);
        cache.clear();

        let _ = cache.get(&mut ex, &abs, &rel);
        assert_eq!(cache.extraction_count(), 2);
    }
}
