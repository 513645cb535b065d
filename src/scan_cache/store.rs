//! Bloom-filter backed "already scanned" record

use crate::bloom::BloomFilter;
use crate::error::CacheError;
use std::ffi::OsString;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Fingerprints of files hashed on earlier runs.
///
/// Shared by every hashing worker; lookups and inserts go straight to the
/// filter's atomic bits.
#[derive(Debug)]
pub struct ScanCache {
    filter: BloomFilter,
    path: PathBuf,
    start_count: u64,
    created: bool,
}

impl ScanCache {
    /// Load the cache at `path`, or create an empty one sized for `capacity`
    /// entries at `fpp` if there is no file there yet.
    pub fn load(path: &Path, capacity: u64, fpp: f64) -> Result<Self, CacheError> {
        if path.is_file() {
            let bytes = std::fs::read(path).map_err(|source| CacheError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let filter = BloomFilter::from_bytes(&bytes).map_err(|source| CacheError::Format {
                path: path.to_path_buf(),
                source,
            })?;
            let start_count = filter.approximate_element_count();
            return Ok(Self {
                filter,
                path: path.to_path_buf(),
                start_count,
                created: false,
            });
        }

        let filter = BloomFilter::with_capacity(capacity, fpp).map_err(CacheError::Create)?;
        Ok(Self {
            filter,
            path: path.to_path_buf(),
            start_count: 0,
            created: true,
        })
    }

    /// Returns true if `fingerprint` was recorded before. Otherwise records
    /// it and returns false, so the file counts as seen from this point on
    /// whether or not hashing it succeeds.
    pub fn should_skip(&self, fingerprint: &str) -> bool {
        if self.filter.might_contain(fingerprint) {
            return true;
        }
        self.filter.insert(fingerprint);
        false
    }

    /// Write the filter to its backing path, first moving any existing file
    /// to `<path>.bak`.
    pub fn persist(&self) -> Result<(), CacheError> {
        let backup = self.backup_path();
        match std::fs::rename(&self.path, &backup) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    "could not move {} to {}: {}",
                    self.path.display(),
                    backup.display(),
                    e
                );
            }
        }

        let write_error = |source| CacheError::Write {
            path: self.path.clone(),
            source,
        };
        let file = File::create(&self.path).map_err(write_error)?;
        self.filter
            .write_to(BufWriter::new(file))
            .map_err(write_error)
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".bak");
        PathBuf::from(name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Approximate entries at load time.
    pub fn start_count(&self) -> u64 {
        self.start_count
    }

    /// Approximate entries added since load.
    pub fn new_entries(&self) -> u64 {
        self.filter
            .approximate_element_count()
            .saturating_sub(self.start_count)
    }

    /// True if no cache file existed and an empty filter was created.
    pub fn is_new(&self) -> bool {
        self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan_cache::fingerprint;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn new_cache(dir: &TempDir) -> ScanCache {
        ScanCache::load(&dir.path().join("cache.bin"), 10_000, 0.0001).unwrap()
    }

    #[test]
    fn test_creates_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        let cache = new_cache(&temp_dir);
        assert!(cache.is_new());
        assert_eq!(cache.start_count(), 0);
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_should_skip_inserts_on_first_check() {
        let temp_dir = TempDir::new().unwrap();
        let cache = new_cache(&temp_dir);
        let fp = fingerprint(Path::new("/a/b"), 10, 20);

        assert!(!cache.should_skip(&fp));
        assert!(cache.should_skip(&fp));
        assert!(cache.should_skip(&fp));
        assert_eq!(cache.new_entries(), 1);
    }

    #[test]
    fn test_persist_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let cache = new_cache(&temp_dir);
        let fp = fingerprint(Path::new("/a/b"), 10, 20);
        cache.should_skip(&fp);
        cache.persist().unwrap();
        assert!(!cache.backup_path().exists());

        let reloaded = new_cache(&temp_dir);
        assert!(!reloaded.is_new());
        assert_eq!(reloaded.start_count(), 1);
        assert!(reloaded.should_skip(&fp));
        assert_eq!(reloaded.new_entries(), 0);
    }

    #[test]
    fn test_persist_rotates_backup() {
        let temp_dir = TempDir::new().unwrap();
        let first = new_cache(&temp_dir);
        first.should_skip("one");
        first.persist().unwrap();
        let first_bytes = fs::read(first.path()).unwrap();

        let second = new_cache(&temp_dir);
        second.should_skip("two");
        second.persist().unwrap();

        assert_eq!(second.backup_path(), temp_dir.path().join("cache.bin.bak"));
        assert_eq!(fs::read(second.backup_path()).unwrap(), first_bytes);
        assert_ne!(fs::read(second.path()).unwrap(), first_bytes);
    }

    #[test]
    fn test_corrupt_cache_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.bin");
        fs::write(&path, b"not a filter").unwrap();

        let result = ScanCache::load(&path, 10_000, 0.0001);
        assert!(matches!(result, Err(CacheError::Format { .. })));
    }

    #[test]
    fn test_persist_unwritable_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing-dir").join("cache.bin");
        let cache = ScanCache::load(&path, 100, 0.01).unwrap();
        assert!(matches!(cache.persist(), Err(CacheError::Write { .. })));
    }

    #[test]
    fn test_concurrent_should_skip_same_fingerprint() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(new_cache(&temp_dir));
        let fp = fingerprint(Path::new("/burst"), 1, 1);
        let misses = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let misses = Arc::clone(&misses);
                let fp = fp.clone();
                std::thread::spawn(move || {
                    if !cache.should_skip(&fp) {
                        misses.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let misses = misses.load(Ordering::Relaxed);
        assert!((1..=16).contains(&misses));
        assert!(cache.should_skip(&fp));
        assert_eq!(cache.new_entries(), 1);
    }
}
