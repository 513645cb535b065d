//! Scan tuning configuration
//!
//! Every field has a default, so an absent or partial TOML file is fine:
//!
//! ```toml
//! max_threads = 4
//! hashing_queue_depth = 16
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest file that will be hashed (10 GiB).
pub const MAXIMUM_FILE_SIZE: u64 = 10 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Upper bound on workers per pool; the actual size is
    /// `min(available_parallelism, max_threads)`.
    pub max_threads: usize,
    /// Queued directory expansions before submitters run them inline.
    pub traversal_queue_depth: usize,
    /// Queued file checks before submitters run them inline.
    pub hashing_queue_depth: usize,
    /// Files larger than this are ignored.
    pub max_file_size: u64,
    /// Bytes per read while hashing.
    pub read_chunk_size: usize,
    /// Expected entries when a new cache filter is created.
    pub cache_capacity: u64,
    /// Target false positive rate for a new cache filter.
    pub cache_fpp: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_threads: 8,
            traversal_queue_depth: 8,
            hashing_queue_depth: 4,
            max_file_size: MAXIMUM_FILE_SIZE,
            read_chunk_size: 4096,
            cache_capacity: 50_000_000,
            cache_fpp: 0.00001,
        }
    }
}

impl ScanConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::Invalid {
                field: "max_threads",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.read_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "read_chunk_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.cache_fpp > 0.0 && self.cache_fpp < 1.0) {
            return Err(ConfigError::Invalid {
                field: "cache_fpp",
                reason: format!("must be between 0 and 1 exclusive, got {}", self.cache_fpp),
            });
        }
        Ok(())
    }

    /// Workers per pool for this machine.
    pub fn worker_count(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        available.min(self.max_threads).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.max_file_size, 10_737_418_240);
        assert_eq!(config.traversal_queue_depth, 8);
        assert_eq!(config.hashing_queue_depth, 4);
        assert!(config.validate().is_ok());
        assert!((1..=8).contains(&config.worker_count()));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("scan.toml");
        fs::write(&path, "max_threads = 2\nread_chunk_size = 65536\n").unwrap();

        let config = ScanConfig::load(&path).unwrap();
        assert_eq!(config.max_threads, 2);
        assert_eq!(config.read_chunk_size, 65536);
        assert_eq!(config.hashing_queue_depth, 4);
    }

    #[test]
    fn test_rejects_unknown_and_invalid_fields() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("scan.toml");

        fs::write(&path, "max_thread = 2\n").unwrap();
        assert!(matches!(ScanConfig::load(&path), Err(ConfigError::Parse { .. })));

        fs::write(&path, "max_threads = 0\n").unwrap();
        assert!(matches!(
            ScanConfig::load(&path),
            Err(ConfigError::Invalid { field: "max_threads", .. })
        ));

        fs::write(&path, "cache_fpp = 1.5\n").unwrap();
        assert!(matches!(
            ScanConfig::load(&path),
            Err(ConfigError::Invalid { field: "cache_fpp", .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = ScanConfig::load(&temp_dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
