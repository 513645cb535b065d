//! Drives the compiled binary end to end.

use hashsweep::bloom::BloomFilter;
use hashsweep::signatures::{MD5_EXTENDED_FILE, MD5_FILE, SHA1_FILE, SHA256_FILE};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn hashsweep(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hashsweep"))
        .args(args)
        .env_remove("HASHSWEEP_LOG")
        .output()
        .unwrap()
}

fn write_filter(path: &Path, keys: &[String]) {
    let filter = BloomFilter::with_capacity(1_000, 0.000001).unwrap();
    for key in keys {
        filter.insert(key);
    }
    fs::write(path, filter.to_bytes()).unwrap();
}

/// Database directory whose filters know the digests of `known`.
fn write_database(dir: &Path, known: &[&str]) {
    let md5: Vec<String> = known
        .iter()
        .map(|k| hex::encode(Md5::digest(k.as_bytes())))
        .collect();
    let sha1: Vec<String> = known
        .iter()
        .map(|k| hex::encode(Sha1::digest(k.as_bytes())))
        .collect();
    let sha256: Vec<String> = known
        .iter()
        .map(|k| hex::encode(Sha256::digest(k.as_bytes())))
        .collect();

    write_filter(&dir.join(MD5_FILE), &md5);
    write_filter(&dir.join(MD5_EXTENDED_FILE), &[]);
    write_filter(&dir.join(SHA1_FILE), &sha1);
    write_filter(&dir.join(SHA256_FILE), &sha256);
}

struct Fixture {
    _temp: TempDir,
    database: PathBuf,
    root: PathBuf,
    config: PathBuf,
    cache: PathBuf,
}

impl Fixture {
    /// Ten one-byte files `0`..`9`; the database knows `3` and `7`.
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let database = temp.path().join("db");
        let root = temp.path().join("scan");
        fs::create_dir(&database).unwrap();
        fs::create_dir(&root).unwrap();
        write_database(&database, &["3", "7"]);

        for i in 0..10 {
            fs::write(root.join(format!("file{}", i)), i.to_string()).unwrap();
        }

        let config = temp.path().join("hashsweep.toml");
        fs::write(&config, "cache_capacity = 10000\ncache_fpp = 0.0001\n").unwrap();

        Self {
            database,
            root,
            config,
            cache: temp.path().join("scan.cache"),
            _temp: temp,
        }
    }

    fn run(&self, cache: &str) -> Output {
        hashsweep(&[
            "--config",
            self.config.to_str().unwrap(),
            self.database.to_str().unwrap(),
            cache,
            self.root.to_str().unwrap(),
        ])
    }

    fn run_cached(&self) -> Output {
        self.run(self.cache.to_str().unwrap())
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_too_few_arguments_exit_1() {
    let output = hashsweep(&["only-a-database"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Please provide a directory for databases"));

    let output = hashsweep(&[]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_cache_without_roots_exit_1() {
    let fixture = Fixture::new();
    let output = hashsweep(&[fixture.database.to_str().unwrap(), "scan.cache"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_invalid_database_directory_exit_1() {
    let fixture = Fixture::new();
    let missing = fixture.root.join("no-such-dir");
    let output = hashsweep(&[
        missing.to_str().unwrap(),
        "null",
        fixture.root.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid databases directory"));
}

#[test]
fn test_missing_filter_exit_1() {
    let fixture = Fixture::new();
    fs::remove_file(fixture.database.join(SHA1_FILE)).unwrap();
    let output = fixture.run("null");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load databases"));
    let out = stdout(&output);
    assert!(out.contains("Databases will be loaded from"));
    assert!(!out.contains("Loaded database:"));
}

#[test]
fn test_corrupt_cache_exit_1() {
    let fixture = Fixture::new();
    fs::write(&fixture.cache, [1u8, 7]).unwrap();
    let output = fixture.run_cached();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load cache"));
}

#[test]
fn test_reports_exactly_the_matching_files() {
    let fixture = Fixture::new();
    let output = fixture.run("null");
    assert_eq!(output.status.code(), Some(0));

    let out = stdout(&output);
    let expected = [fixture.root.join("file3"), fixture.root.join("file7")];
    let reported: Vec<&str> = out
        .lines()
        .filter(|line| line.starts_with(fixture.root.to_str().unwrap()))
        .collect();
    assert_eq!(reported.len(), 2, "stdout was:\n{}", out);
    for path in &expected {
        assert!(reported.contains(&path.to_str().unwrap()));
    }

    assert!(out.contains("Loaded database:"));
    assert!(out.contains("Cache disabled"));
    assert!(out.contains("Hashed 10 files, totalling 0MB"));
    assert!(out.contains("skipped 0 files already in cache"));
    assert!(out.contains("Skipped saving permanent cache, no changes"));
}

#[test]
fn test_cache_skips_second_run_and_rotates_backup() {
    let fixture = Fixture::new();

    let first = stdout(&fixture.run_cached());
    assert!(first.contains("Created new cache with max size of 10000 entries"));
    assert!(first.contains("Saving to permanent cache"));
    assert!(first.contains("Saved permanent cache with"));
    assert!(fixture.cache.is_file());

    let second = stdout(&fixture.run_cached());
    assert!(second.contains("Loaded cache with"));
    assert!(second.contains("Hashed 0 files"));
    assert!(second.contains("skipped 10 files already in cache"));
    assert!(second.contains("Skipped saving permanent cache, no changes"));

    fs::write(fixture.root.join("file10"), "10").unwrap();
    let third = stdout(&fixture.run_cached());
    assert!(third.contains("Hashed 1 files"));
    assert!(third.contains("skipped 10 files already in cache"));

    let mut backup = fixture.cache.clone().into_os_string();
    backup.push(".bak");
    assert!(PathBuf::from(backup).is_file());
}

#[test]
fn test_missing_root_is_reported_not_fatal() {
    let fixture = Fixture::new();
    let missing = fixture.root.join("gone");
    let output = hashsweep(&[
        fixture.database.to_str().unwrap(),
        "null",
        missing.to_str().unwrap(),
        fixture.root.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    assert!(out.contains("Path doesn't exist:"));
    assert!(out.contains("Hashed 10 files"));
}

#[test]
fn test_json_summary() {
    let fixture = Fixture::new();
    let output = hashsweep(&[
        "--json",
        "--no-cache-arg",
        fixture.database.to_str().unwrap(),
        fixture.root.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(0));

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["summary"]["files_hashed"], 10);
    assert_eq!(value["summary"]["bytes_read"], 10);
    assert_eq!(value["matches"].as_array().unwrap().len(), 2);
    assert_eq!(value["cache"]["status"], "disabled");
}
