// End-to-end checks of the `repomap` binary: map output content,
// file output, config init and cache clearing.
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

// A small two-file project: b.py (the chat file) calls a function
// defined in a.py, so the map must surface a.py's definition.
fn make_fixture() -> assert_fs::TempDir {
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    tmp.child("a.py")
        .write_str(
            "def compute_total(xs):\n    total = 0\n    for x in xs:\n        total += x\n    return total\n",
        )
        .expect("write a.py");

    tmp.child("b.py")
        .write_str(
            "from a import compute_total\n\n\
             print(compute_total([1, 2]))\n\
             print(compute_total([3]))\n",
        )
        .expect("write b.py");

    tmp
}

fn bin() -> Command {
    Command::cargo_bin("repomap").expect("binary builds")
}

#[test]
fn map_surfaces_referenced_definition() {
    let tmp = make_fixture();

    let assert = bin()
        .current_dir(tmp.path())
        .args(["--quiet", "map", "--chat-file", "b.py"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");

    // The referenced file appears with an excerpt header and the
    // definition line; the chat file's own body never does.
    assert!(stdout.contains("a.py:"), "stdout was: {stdout}");
    assert!(stdout.contains("compute_total"), "stdout was: {stdout}");
    assert!(!stdout.contains("b.py"), "stdout was: {stdout}");
}

#[test]
fn map_respects_output_flag() {
    let tmp = make_fixture();

    bin()
        .current_dir(tmp.path())
        .args([
            "--quiet",
            "map",
            "--chat-file",
            "b.py",
            "--output",
            "map.txt",
        ])
        .assert()
        .success();

    tmp.child("map.txt")
        .assert(predicate::str::contains("compute_total"));
}

#[test]
fn map_requires_a_chat_file() {
    let tmp = make_fixture();

    bin()
        .current_dir(tmp.path())
        .args(["--quiet", "map"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--chat-file"));
}

#[test]
fn map_rejects_missing_chat_file() {
    let tmp = make_fixture();

    bin()
        .current_dir(tmp.path())
        .args(["--quiet", "map", "--chat-file", "nope.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn init_writes_config_once() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    bin()
        .current_dir(tmp.path())
        .args(["--quiet", "init"])
        .assert()
        .success();

    tmp.child("repomap.toml")
        .assert(predicate::str::contains("max_tokens"));

    // A second init without --force must refuse to overwrite.
    bin()
        .current_dir(tmp.path())
        .args(["--quiet", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    bin()
        .current_dir(tmp.path())
        .args(["--quiet", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn clear_cache_drops_the_store() {
    let tmp = make_fixture();

    // A map run populates the persistent tag cache.
    bin()
        .current_dir(tmp.path())
        .args(["--quiet", "map", "--chat-file", "b.py"])
        .assert()
        .success();

    let cache_dirs = || {
        std::fs::read_dir(tmp.path())
            .expect("read root")
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with(".repomap.tags.cache")
            })
            .count()
    };
    assert_eq!(cache_dirs(), 1, "map run should create the cache dir");

    bin()
        .current_dir(tmp.path())
        .args(["--quiet", "clear-cache"])
        .assert()
        .success();

    // clear() recreates the directory, but it must be empty again.
    let entries: Vec<_> = std::fs::read_dir(
        std::fs::read_dir(tmp.path())
            .expect("read root")
            .filter_map(|e| e.ok())
            .find(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with(".repomap.tags.cache")
            })
            .expect("cache dir present")
            .path(),
    )
    .expect("read cache dir")
    .collect();
    assert!(entries.is_empty(), "cache dir should be empty after clear");
}
