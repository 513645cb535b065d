//! Scan engine
//!
//! A [`RunContext`] owns everything one invocation shares across threads:
//! the signature database, the optional scan cache, two bounded worker pools
//! and the run counters. Roots are scanned one at a time; each root's task
//! tree is tracked by a [`CompletionLatch`] and fully drained before the
//! next root starts.

pub mod hashing;
pub mod latch;
pub mod pool;
mod traversal;
pub mod volume;

use crate::config::ScanConfig;
use crate::error::CacheError;
use crate::output::OutputMode;
use crate::scan_cache::ScanCache;
use crate::signatures::SignatureDatabase;
use crate::utils;
use hashing::{ContentSource, FsContentSource};
use latch::{CompletionLatch, LatchGuard};
use pool::{Dispatch, WorkerPool};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use volume::{SystemVolumeProbe, VolumeProbe};

/// One unit of pool work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTask {
    /// List a directory and fan out its children. `origin_volume` is the
    /// capacity of the root's volume, used to stop at mount boundaries.
    ExpandDirectory { path: PathBuf, origin_volume: u64 },
    /// Cache check, hash and match one regular file.
    CheckFile { path: PathBuf },
}

/// Counters updated by every worker during a run.
#[derive(Debug, Default)]
pub struct RunCounters {
    files_hashed: AtomicU64,
    cache_skips: AtomicU64,
    bytes_read: AtomicU64,
    directories: AtomicU64,
    matches: AtomicU64,
    inline_tasks: AtomicU64,
}

impl RunCounters {
    pub fn record_file(&self) {
        self.files_hashed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_skip(&self) {
        self.cache_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_directory(&self) {
        self.directories.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match(&self) {
        self.matches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inline(&self) {
        self.inline_tasks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn files_hashed(&self) -> u64 {
        self.files_hashed.load(Ordering::Relaxed)
    }

    pub fn cache_skips(&self) -> u64 {
        self.cache_skips.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn directories(&self) -> u64 {
        self.directories.load(Ordering::Relaxed)
    }

    pub fn matches(&self) -> u64 {
        self.matches.load(Ordering::Relaxed)
    }

    pub fn inline_tasks(&self) -> u64 {
        self.inline_tasks.load(Ordering::Relaxed)
    }
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub files_hashed: u64,
    pub cache_skips: u64,
    /// Bytes actually streamed through the digests, which can differ from the
    /// stat length if a file changes while being read.
    pub bytes_read: u64,
    pub directories: u64,
    pub elapsed_ms: u64,
    pub matches: Vec<PathBuf>,
}

impl RunSummary {
    /// Decimal megabytes, truncated.
    pub fn megabytes_read(&self) -> u64 {
        self.bytes_read / 1000 / 1000
    }

    /// Throughput in whole MB/s. Runs of a second or less report the total.
    pub fn mb_per_second(&self) -> u64 {
        let mb = self.megabytes_read();
        if self.elapsed_ms > 1000 {
            (mb as f64 / (self.elapsed_ms as f64 / 1000.0)) as u64
        } else {
            mb
        }
    }
}

/// What happened to the scan cache at shutdown.
#[derive(Debug)]
pub enum CacheOutcome {
    Disabled,
    /// Nothing was hashed, so nothing new could have been recorded.
    NoChanges,
    Saved { new_entries: u64 },
    Failed(CacheError),
}

pub struct RunContext {
    config: ScanConfig,
    database: SignatureDatabase,
    cache: Option<ScanCache>,
    traversal_pool: WorkerPool,
    hashing_pool: WorkerPool,
    counters: RunCounters,
    volume_probe: Box<dyn VolumeProbe>,
    content_source: Box<dyn ContentSource>,
    mode: OutputMode,
    matches: Mutex<Vec<PathBuf>>,
}

impl RunContext {
    pub fn builder(database: SignatureDatabase) -> RunContextBuilder {
        RunContextBuilder::new(database)
    }

    /// Scan each root in order and return the totals.
    pub fn run(self: &Arc<Self>, roots: &[PathBuf]) -> RunSummary {
        let started = Instant::now();
        for root in roots {
            self.scan_root(root);
        }
        self.summary(started.elapsed())
    }

    /// Scan one tree and wait for every task it spawned to finish.
    pub fn scan_root(self: &Arc<Self>, root: &Path) {
        if !root.exists() {
            if self.mode == OutputMode::Normal {
                println!("Path doesn't exist: {}", utils::display_path(root));
            }
            tracing::warn!("path doesn't exist: {}", root.display());
            return;
        }
        if !root.is_dir() {
            tracing::warn!("not a directory, skipping: {}", root.display());
            return;
        }

        let origin_volume = self.volume_probe.total_space(root);
        tracing::info!(
            "scanning {} (volume size {})",
            root.display(),
            origin_volume
        );

        let latch = CompletionLatch::new();
        self.submit(
            &latch,
            ScanTask::ExpandDirectory {
                path: root.to_path_buf(),
                origin_volume,
            },
        );
        latch.wait();

        tracing::info!(
            "finished {}: {} files hashed, {} skipped",
            root.display(),
            self.counters.files_hashed(),
            self.counters.cache_skips()
        );
    }

    /// Save the cache if it is enabled and this run hashed anything.
    pub fn persist_cache(&self) -> CacheOutcome {
        let Some(cache) = &self.cache else {
            return CacheOutcome::Disabled;
        };
        if self.counters.files_hashed() == 0 {
            return CacheOutcome::NoChanges;
        }
        match cache.persist() {
            Ok(()) => CacheOutcome::Saved {
                new_entries: cache.new_entries(),
            },
            Err(e) => {
                tracing::warn!("{}", e);
                CacheOutcome::Failed(e)
            }
        }
    }

    pub fn summary(&self, elapsed: Duration) -> RunSummary {
        let mut matches = self
            .matches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        matches.sort();

        RunSummary {
            files_hashed: self.counters.files_hashed(),
            cache_skips: self.counters.cache_skips(),
            bytes_read: self.counters.bytes_read(),
            directories: self.counters.directories(),
            elapsed_ms: elapsed.as_millis() as u64,
            matches,
        }
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn database(&self) -> &SignatureDatabase {
        &self.database
    }

    pub fn cache(&self) -> Option<&ScanCache> {
        self.cache.as_ref()
    }

    pub(crate) fn volume_probe(&self) -> &dyn VolumeProbe {
        self.volume_probe.as_ref()
    }

    pub(crate) fn content_source(&self) -> &dyn ContentSource {
        self.content_source.as_ref()
    }

    /// Hand `task` to its pool, registering it with `latch` first.
    pub(crate) fn submit(self: &Arc<Self>, latch: &Arc<CompletionLatch>, task: ScanTask) {
        let guard = latch.enter();
        let pool = match &task {
            ScanTask::ExpandDirectory { .. } => &self.traversal_pool,
            ScanTask::CheckFile { .. } => &self.hashing_pool,
        };
        let ctx = Arc::clone(self);
        if pool.execute(move || ctx.run_task(guard, task)) == Dispatch::Inline {
            self.counters.record_inline();
        }
    }

    fn run_task(self: &Arc<Self>, guard: LatchGuard, task: ScanTask) {
        match task {
            ScanTask::ExpandDirectory {
                path,
                origin_volume,
            } => traversal::expand_directory(self, guard.latch(), &path, origin_volume),
            ScanTask::CheckFile { path } => hashing::check_file(self, &path),
        }
        drop(guard);
    }

    pub(crate) fn report_match(&self, path: &Path) {
        self.counters.record_match();
        if self.mode != OutputMode::Json {
            println!("{}", utils::display_path(path));
        }
        self.matches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("config", &self.config)
            .field("cache", &self.cache.as_ref().map(|c| c.path()))
            .field("traversal_pool", &self.traversal_pool)
            .field("hashing_pool", &self.hashing_pool)
            .field("counters", &self.counters)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Builder for [`RunContext`]
pub struct RunContextBuilder {
    database: SignatureDatabase,
    config: ScanConfig,
    cache: Option<ScanCache>,
    volume_probe: Box<dyn VolumeProbe>,
    content_source: Box<dyn ContentSource>,
    mode: OutputMode,
}

impl RunContextBuilder {
    pub fn new(database: SignatureDatabase) -> Self {
        Self {
            database,
            config: ScanConfig::default(),
            cache: None,
            volume_probe: Box::new(SystemVolumeProbe),
            content_source: Box::new(FsContentSource),
            mode: OutputMode::Normal,
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cache(mut self, cache: Option<ScanCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_volume_probe(mut self, probe: Box<dyn VolumeProbe>) -> Self {
        self.volume_probe = probe;
        self
    }

    pub fn with_content_source(mut self, source: Box<dyn ContentSource>) -> Self {
        self.content_source = source;
        self
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<Arc<RunContext>, rayon::ThreadPoolBuildError> {
        let workers = self.config.worker_count();
        let traversal_pool =
            WorkerPool::new("traverse", workers, self.config.traversal_queue_depth)?;
        let hashing_pool = WorkerPool::new("hash", workers, self.config.hashing_queue_depth)?;

        Ok(Arc::new(RunContext {
            config: self.config,
            database: self.database,
            cache: self.cache,
            traversal_pool,
            hashing_pool,
            counters: RunCounters::default(),
            volume_probe: self.volume_probe,
            content_source: self.content_source,
            mode: self.mode,
            matches: Mutex::new(Vec::new()),
        }))
    }
}
