//! Directory expansion
//!
//! Each directory task lists its immediate children and fans them out:
//! subdirectories on the same volume go back to the traversal pool, regular
//! files within the size limit go to the hashing pool. Symlinks, reparse
//! points and unreadable entries are dropped.

use super::latch::CompletionLatch;
use super::volume::same_volume;
use super::{RunContext, ScanTask};
use crate::utils;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

pub(crate) fn expand_directory(
    ctx: &Arc<RunContext>,
    latch: &Arc<CompletionLatch>,
    dir: &Path,
    origin_volume: u64,
) {
    ctx.counters().record_directory();

    // Listing failures (permission denied, directory removed) yield no
    // entries; the walk carries on elsewhere. The listing is drained first so
    // the handle is closed before a saturated pool runs a child inline here.
    let entries: Vec<_> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("cannot list entry under {}: {}", dir.display(), e);
                None
            }
        })
        .collect();

    for entry in entries {
        let path = entry.path();

        if entry.path_is_symlink() || utils::is_windows_reparse_point(path) {
            debug!("not following link {}", path.display());
            continue;
        }
        if !utils::is_readable(path) {
            debug!("skipping unreadable {}", path.display());
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            let volume = ctx.volume_probe().total_space(path);
            if same_volume(origin_volume, volume) {
                ctx.submit(
                    latch,
                    ScanTask::ExpandDirectory {
                        path: path.to_path_buf(),
                        origin_volume,
                    },
                );
            } else {
                debug!(
                    "not crossing into {} (volume size {} != {})",
                    path.display(),
                    volume,
                    origin_volume
                );
            }
        } else if file_type.is_file() {
            let len = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    debug!("cannot stat {}: {}", path.display(), e);
                    continue;
                }
            };
            if len > 0 && len <= ctx.config().max_file_size {
                ctx.submit(
                    latch,
                    ScanTask::CheckFile {
                        path: path.to_path_buf(),
                    },
                );
            }
        }
    }
}
