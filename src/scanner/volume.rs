//! Mount-boundary detection.
//!
//! A directory is treated as living on the root's volume when the volume
//! holding it reports the same total capacity as the root's volume. Two
//! different mounts of identical size are indistinguishable under this rule,
//! and a volume whose capacity cannot be read reports 0.

use crate::utils;
use std::path::Path;

/// Reports the total capacity of the volume holding a path.
pub trait VolumeProbe: Send + Sync {
    /// Capacity in bytes, or 0 if it cannot be determined.
    fn total_space(&self, path: &Path) -> u64;
}

/// Queries the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVolumeProbe;

impl VolumeProbe for SystemVolumeProbe {
    fn total_space(&self, path: &Path) -> u64 {
        utils::volume_total_space(path).unwrap_or(0)
    }
}

/// Whether a directory whose volume reports `candidate` bytes belongs to the
/// volume the scan started on (`origin` bytes).
pub fn same_volume(origin: u64, candidate: u64) -> bool {
    origin == candidate
}
