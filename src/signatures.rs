//! Known-file signature database
//!
//! Four Bloom filters keyed by lowercase hex digests, loaded together from a
//! database directory and read-only afterwards.

use crate::bloom::BloomFilter;
use crate::error::DatabaseError;
use std::path::Path;

pub const MD5_FILE: &str = "hypatia-md5-bloom.bin";
pub const MD5_EXTENDED_FILE: &str = "hypatia-md5-extended-bloom.bin";
pub const SHA1_FILE: &str = "hypatia-sha1-bloom.bin";
pub const SHA256_FILE: &str = "hypatia-sha256-bloom.bin";

/// Approximate element counts for each filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseCounts {
    pub md5: u64,
    pub md5_extended: u64,
    pub sha1: u64,
    pub sha256: u64,
}

#[derive(Debug)]
pub struct SignatureDatabase {
    md5: BloomFilter,
    md5_extended: BloomFilter,
    sha1: BloomFilter,
    sha256: BloomFilter,
}

impl SignatureDatabase {
    /// Load all four filters from `dir`. Fails if any one is missing or
    /// malformed.
    pub fn load(dir: &Path) -> Result<Self, DatabaseError> {
        if !dir.is_dir() {
            return Err(DatabaseError::NotADirectory(dir.to_path_buf()));
        }

        Ok(Self {
            md5: load_filter(&dir.join(MD5_FILE))?,
            md5_extended: load_filter(&dir.join(MD5_EXTENDED_FILE))?,
            sha1: load_filter(&dir.join(SHA1_FILE))?,
            sha256: load_filter(&dir.join(SHA256_FILE))?,
        })
    }

    pub fn from_filters(
        md5: BloomFilter,
        md5_extended: BloomFilter,
        sha1: BloomFilter,
        sha256: BloomFilter,
    ) -> Self {
        Self {
            md5,
            md5_extended,
            sha1,
            sha256,
        }
    }

    /// True if any digest is (probably) a known signature.
    pub fn matches(&self, md5_hex: &str, sha1_hex: &str, sha256_hex: &str) -> bool {
        self.md5.might_contain(md5_hex)
            || self.md5_extended.might_contain(md5_hex)
            || self.sha1.might_contain(sha1_hex)
            || self.sha256.might_contain(sha256_hex)
    }

    pub fn counts(&self) -> DatabaseCounts {
        DatabaseCounts {
            md5: self.md5.approximate_element_count(),
            md5_extended: self.md5_extended.approximate_element_count(),
            sha1: self.sha1.approximate_element_count(),
            sha256: self.sha256.approximate_element_count(),
        }
    }
}

fn load_filter(path: &Path) -> Result<BloomFilter, DatabaseError> {
    let bytes = std::fs::read(path).map_err(|source| DatabaseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    BloomFilter::from_bytes(&bytes).map_err(|source| DatabaseError::Format {
        path: path.to_path_buf(),
        source,
    })
}
