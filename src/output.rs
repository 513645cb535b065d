use crate::scan_cache::ScanCache;
use crate::scanner::{CacheOutcome, RunSummary};
use crate::signatures::DatabaseCounts;
use crate::utils;
use chrono::{DateTime, Utc};
use colored::*;
use serde::Serialize;

/// Output verbosity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Quiet,  // Only matches and errors
    Normal, // Standard output
    Json,   // One JSON document at the end
}

pub fn print_database_dir(dir: &std::path::Path, mode: OutputMode) {
    if mode == OutputMode::Normal {
        println!("Databases will be loaded from {}", utils::display_path(dir));
    }
}

pub fn print_database_loaded(counts: &DatabaseCounts, mode: OutputMode) {
    if mode != OutputMode::Normal {
        return;
    }
    println!("Loaded database:");
    println!("\tMD5: {}", counts.md5);
    println!("\tMD5E: {}", counts.md5_extended);
    println!("\tSHA1: {}", counts.sha1);
    println!("\tSHA256: {}", counts.sha256);
}

pub fn print_cache_status(cache: Option<&ScanCache>, capacity: u64, mode: OutputMode) {
    if mode != OutputMode::Normal {
        return;
    }
    match cache {
        None => println!("Cache disabled"),
        Some(cache) if cache.is_new() => {
            println!("Created new cache with max size of {} entries", capacity)
        }
        Some(cache) => println!("Loaded cache with {} entries", cache.start_count()),
    }
}

/// The closing "Hashed N files..." line.
pub fn summary_line(summary: &RunSummary) -> String {
    format!(
        "Hashed {} files, totalling {}MB, {}ms at {}MBps, skipped {} files already in cache",
        summary.files_hashed,
        summary.megabytes_read(),
        summary.elapsed_ms,
        summary.mb_per_second(),
        summary.cache_skips
    )
}

pub fn print_summary(summary: &RunSummary, mode: OutputMode) {
    if mode == OutputMode::Normal {
        println!("{}", summary_line(summary));
    }
}

/// Report the result of saving. "Saving to permanent cache" is printed by
/// the caller before the write starts.
pub fn print_cache_outcome(outcome: &CacheOutcome, mode: OutputMode) {
    match outcome {
        CacheOutcome::Failed(e) => {
            if mode != OutputMode::Json {
                eprintln!("{} Failed to save permanent cache: {}", "Error:".red(), e);
            }
        }
        _ if mode != OutputMode::Normal => {}
        CacheOutcome::Saved { new_entries } => {
            println!("Saved permanent cache with {} new entries", new_entries);
        }
        CacheOutcome::Disabled | CacheOutcome::NoChanges => {
            println!("Skipped saving permanent cache, no changes");
        }
    }
}

#[derive(Serialize)]
struct JsonResults {
    version: String,
    timestamp: DateTime<Utc>,
    summary: JsonSummary,
    matches: Vec<String>,
    cache: JsonCache,
}

#[derive(Serialize)]
struct JsonSummary {
    files_hashed: u64,
    cache_skips: u64,
    bytes_read: u64,
    megabytes_read: u64,
    directories: u64,
    elapsed_ms: u64,
    mb_per_second: u64,
}

#[derive(Serialize)]
struct JsonCache {
    status: &'static str,
    new_entries: Option<u64>,
    error: Option<String>,
}

pub fn json_report(summary: &RunSummary, outcome: &CacheOutcome) -> anyhow::Result<String> {
    let cache = match outcome {
        CacheOutcome::Disabled => JsonCache {
            status: "disabled",
            new_entries: None,
            error: None,
        },
        CacheOutcome::NoChanges => JsonCache {
            status: "unchanged",
            new_entries: None,
            error: None,
        },
        CacheOutcome::Saved { new_entries } => JsonCache {
            status: "saved",
            new_entries: Some(*new_entries),
            error: None,
        },
        CacheOutcome::Failed(e) => JsonCache {
            status: "failed",
            new_entries: None,
            error: Some(e.to_string()),
        },
    };

    let results = JsonResults {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        summary: JsonSummary {
            files_hashed: summary.files_hashed,
            cache_skips: summary.cache_skips,
            bytes_read: summary.bytes_read,
            megabytes_read: summary.megabytes_read(),
            directories: summary.directories,
            elapsed_ms: summary.elapsed_ms,
            mb_per_second: summary.mb_per_second(),
        },
        matches: summary
            .matches
            .iter()
            .map(|p| utils::display_path(p))
            .collect(),
        cache,
    };
    Ok(serde_json::to_string_pretty(&results)?)
}

pub fn print_json(summary: &RunSummary, outcome: &CacheOutcome) -> anyhow::Result<()> {
    println!("{}", json_report(summary, outcome)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn summary() -> RunSummary {
        RunSummary {
            files_hashed: 10,
            cache_skips: 3,
            bytes_read: 5_500_000,
            directories: 2,
            elapsed_ms: 42,
            matches: vec![PathBuf::from("/scan/a"), PathBuf::from("/scan/b")],
        }
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(
            summary_line(&summary()),
            "Hashed 10 files, totalling 5MB, 42ms at 5MBps, skipped 3 files already in cache"
        );
    }

    #[test]
    fn test_json_report() {
        let json = json_report(&summary(), &CacheOutcome::Saved { new_entries: 7 }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["summary"]["files_hashed"], 10);
        assert_eq!(value["summary"]["megabytes_read"], 5);
        assert_eq!(value["matches"][1], "/scan/b");
        assert_eq!(value["cache"]["status"], "saved");
        assert_eq!(value["cache"]["new_entries"], 7);
    }

    #[test]
    fn test_json_report_disabled_cache() {
        let json = json_report(&summary(), &CacheOutcome::Disabled).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["cache"]["status"], "disabled");
        assert!(value["cache"]["new_entries"].is_null());
    }
}
