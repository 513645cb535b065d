//! Error types for the scanner library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors decoding or sizing a Bloom filter.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("filter data truncated: need {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unknown filter strategy ordinal {0}")]
    UnknownStrategy(u8),

    #[error("invalid filter parameters: {0}")]
    InvalidParameters(String),
}

/// Errors loading the signature database.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("invalid databases directory: {0}")]
    NotADirectory(PathBuf),

    #[error("failed to read signature file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse signature file {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: FilterError,
    },
}

/// Errors loading or saving the scan cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to read cache {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse cache {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: FilterError,
    },

    #[error("failed to create cache filter: {0}")]
    Create(#[source] FilterError),

    #[error("failed to write cache {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-file failures while hashing. Never fatal to a run.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors loading or validating the tuning configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
