//! Incremental scan cache
//!
//! Remembers which files were hashed on earlier runs by storing a fingerprint
//! of (absolute path, size, mtime) in a persistent Bloom filter. A file whose
//! fingerprint is present is skipped; a false positive means a changed or new
//! file is occasionally skipped too.

pub mod signature;
pub mod store;

pub use signature::{fingerprint, FileSignature};
pub use store::ScanCache;
