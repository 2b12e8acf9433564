//! End-to-end tests of the `pagewatch` binary's offline subcommands.
//!
//! Run with: cargo test --test cli

use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG_KEYS: &[&str] = &[
    "WEBSITE_URL",
    "WAIT_TIMEOUT",
    "REPO_PATH",
    "COMPARISON_OUTPUT",
    "HEADLESS",
    "USE_COOKIES",
    "COOKIES_PATH",
    "VIEWPORT",
    "USER_AGENT",
    "PAGEWATCH_CONFIG",
];

/// The binary, isolated from the caller's environment and `.env` files.
fn pagewatch(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pagewatch").unwrap();
    cmd.current_dir(dir.path());
    for key in CONFIG_KEYS {
        cmd.env_remove(key);
    }
    cmd
}

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn report(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn compare_reports_changes() {
    let dir = TempDir::new().unwrap();
    let previous = write(&dir, "prev.html", "<html><body><p>Test content</p></body></html>");
    let current = write(&dir, "cur.html", "<html><body><p>Test content updated</p></body></html>");

    pagewatch(&dir)
        .args(["compare", "prev.html", "cur.html", "--output", "out/changes.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Changes detected"));

    let json = report(&dir.path().join("out/changes.json"));
    assert_eq!(json["has_changes"], true);
    assert_eq!(json["previous_file"], "prev.html");
    assert_eq!(json["current_file"], "cur.html");
    assert!(previous.exists() && current.exists());
}

#[test]
fn compare_identical_snapshots() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.html", "<body><p>same</p><script>Math.random()</script></body>");
    write(&dir, "b.html", "<body><p>same</p><script>Date.now()</script></body>");

    pagewatch(&dir)
        .env("COMPARISON_OUTPUT", "changes.json")
        .args(["compare", "a.html", "b.html"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes detected"));

    let json = report(&dir.path().join("changes.json"));
    assert_eq!(json["has_changes"], false);
    assert_eq!(json["diff_summary"], "No changes detected");
}

#[test]
fn compare_missing_snapshot_writes_error_report() {
    let dir = TempDir::new().unwrap();
    write(&dir, "cur.html", "<body>x</body>");

    pagewatch(&dir)
        .args(["compare", "missing.html", "cur.html", "--output", "changes.json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Comparison failed"));

    let json = report(&dir.path().join("changes.json"));
    assert_eq!(json["has_changes"], false);
    assert!(json["error"].as_str().unwrap().contains("missing.html"));
}

#[test]
fn prune_removes_old_snapshots() {
    let dir = TempDir::new().unwrap();
    let pages = dir.path().join("scraped_pages");
    fs::create_dir_all(&pages).unwrap();
    let stale = pages.join("chat_20200101T000000Z.html");
    let fresh = pages.join("chat_20990101T000000Z.html");
    fs::write(&stale, "<html></html>").unwrap();
    fs::write(&fresh, "<html></html>").unwrap();
    File::options()
        .write(true)
        .open(&stale)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(45 * 24 * 60 * 60))
        .unwrap();

    pagewatch(&dir)
        .args(["prune", "--days", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 snapshots"));

    assert!(!stale.exists());
    assert!(fresh.exists());
}

#[test]
fn invalid_configuration_fails() {
    let dir = TempDir::new().unwrap();

    pagewatch(&dir)
        .env("WAIT_TIMEOUT", "0")
        .args(["prune"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
