//! File reading helpers for the extraction and rendering layers.
//!
//! Large files are memory-mapped instead of buffered; binary or unreadable
//! files surface as `None` so callers can degrade to an empty result
//! without special-casing IO errors.

use std::fs::File;
use std::path::Path;
use std::time::UNIX_EPOCH;

use memmap2::Mmap;

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

/// Read a file as UTF-8 text. Returns `None` when the file is missing,
/// unreadable, or not valid UTF-8 (treated as binary).
pub fn read_text(path: &Path) -> Option<String> {
    let metadata = std::fs::metadata(path).ok()?;

    if metadata.len() > MMAP_THRESHOLD {
        let file = File::open(path).ok()?;

        // Safety: the map is read-only and dropped before return
        let mmap = unsafe { Mmap::map(&file) }.ok()?;

        std::str::from_utf8(&mmap).ok().map(|s| s.to_string())
    } else {
        let bytes = std::fs::read(path).ok()?;

        String::from_utf8(bytes).ok()
    }
}

/// Modification time of a file in nanoseconds since the Unix epoch.
/// `None` when the file cannot be stat'ed.
pub fn mtime_ns(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;

    let ns = modified.duration_since(UNIX_EPOCH).ok()?.as_nanos();

    u64::try_from(ns).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_text_handles_missing_and_binary() {
        assert!(read_text(Path::new("/nonexistent/file.rs")).is_none());

        let dir = tempfile::TempDir::new().unwrap();
        let bin = dir.path().join("blob.bin");
        std::fs::write(&bin, [0xFFu8, 0xFE, 0x00, 0x01]).unwrap();
        assert!(read_text(&bin).is_none());

        let txt = dir.path().join("ok.txt");
        std::fs::write(&txt, "hello\n").unwrap();
        assert_eq!(read_text(&txt).as_deref(), Some("hello\n"));
    }

    #[test]
    fn mtime_is_present_for_real_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let p = dir.path().join("f.txt");

        std::fs::write(&p, "one").unwrap();
        assert!(mtime_ns(&p).unwrap() > 0);
        assert!(mtime_ns(Path::new("/nonexistent")).is_none());
    }
}
