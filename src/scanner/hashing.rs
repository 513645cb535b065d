//! Single-pass multi-digest hashing and signature matching

use super::RunContext;
use crate::error::FileError;
use crate::scan_cache::signature::{absolute_path, FileSignature};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Opens file contents for hashing.
pub trait ContentSource: Send + Sync {
    fn open(&self, path: &Path) -> std::io::Result<Box<dyn Read + Send>>;
}

/// Reads straight from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsContentSource;

impl ContentSource for FsContentSource {
    fn open(&self, path: &Path) -> std::io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }
}

/// Finalized digests of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestOutcome {
    pub md5: [u8; 16],
    pub sha1: [u8; 20],
    pub sha256: [u8; 32],
    pub bytes_read: u64,
}

/// Lowercase fixed-width hex renderings, as stored in the signature sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestHex {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

impl DigestOutcome {
    pub fn to_hex(&self) -> DigestHex {
        DigestHex {
            md5: hex::encode(self.md5),
            sha1: hex::encode(self.sha1),
            sha256: hex::encode(self.sha256),
        }
    }
}

/// Stream `path` through MD5, SHA-1 and SHA-256 in `chunk_size` reads.
pub fn hash_content(
    source: &dyn ContentSource,
    path: &Path,
    chunk_size: usize,
) -> Result<DigestOutcome, FileError> {
    let mut reader = source.open(path).map_err(|source| FileError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut bytes_read = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(FileError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let chunk = &buffer[..n];
        md5.update(chunk);
        sha1.update(chunk);
        sha256.update(chunk);
        bytes_read += n as u64;
    }

    let mut outcome = DigestOutcome {
        md5: [0; 16],
        sha1: [0; 20],
        sha256: [0; 32],
        bytes_read,
    };
    outcome.md5.copy_from_slice(&md5.finalize());
    outcome.sha1.copy_from_slice(&sha1.finalize());
    outcome.sha256.copy_from_slice(&sha256.finalize());
    Ok(outcome)
}

/// Check one file: consult the cache, hash, match, count.
pub(crate) fn check_file(ctx: &RunContext, path: &Path) {
    if let Some(cache) = ctx.cache() {
        // Files that vanished since traversal still get a key, like any other
        // file that fails to hash.
        let signature = FileSignature::from_path(path).unwrap_or_else(|_| FileSignature {
            path: absolute_path(path),
            size: 0,
            mtime_millis: 0,
        });
        if cache.should_skip(&signature.fingerprint()) {
            ctx.counters().record_cache_skip();
            return;
        }
    }

    match hash_content(ctx.content_source(), path, ctx.config().read_chunk_size) {
        Ok(outcome) => {
            ctx.counters().add_bytes(outcome.bytes_read);
            let digests = outcome.to_hex();
            if ctx
                .database()
                .matches(&digests.md5, &digests.sha1, &digests.sha256)
            {
                ctx.report_match(path);
            }
        }
        Err(e) => tracing::debug!("skipping unreadable file: {}", e),
    }
    ctx.counters().record_file();
}
