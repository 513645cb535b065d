//! File signature and cache fingerprint computation

use sha2::{Digest, Sha512};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// The metadata a cache entry is derived from.
///
/// Path, size and mtime are a cheap proxy for "content may have changed".
/// Content rewritten without touching size or mtime is not detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSignature {
    pub path: PathBuf,
    pub size: u64,
    pub mtime_millis: i64,
}

impl FileSignature {
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let mtime_millis = metadata.modified().map(system_time_to_millis).unwrap_or(0);
        Self {
            path: absolute_path(path),
            size: metadata.len(),
            mtime_millis,
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self::from_metadata(path, &metadata))
    }

    /// Cache key for this signature.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.path, self.size, self.mtime_millis)
    }
}

/// Lowercase hex SHA-512 of `"{path};{size};{mtime_millis};"`.
pub fn fingerprint(path: &Path, size: u64, mtime_millis: i64) -> String {
    let tag = format!("{};{};{};", path.to_string_lossy(), size, mtime_millis);
    hex::encode(Sha512::digest(tag.as_bytes()))
}

/// Resolve against the working directory without touching the filesystem.
pub fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn system_time_to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis() as i64,
        Err(before_epoch) => -(before_epoch.duration().as_millis() as i64),
    }
}
