//! Bounded worker pool with caller-runs backpressure
//!
//! A rayon pool accepts at most `workers + queue_depth` tasks at a time.
//! When that many are already admitted, [`WorkerPool::execute`] runs the
//! task on the calling thread instead, so submission never blocks and memory
//! for pending work stays bounded.

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Caller-runs recursion nests one directory expansion per tree level.
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Where a submitted task ended up running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Queued,
    Inline,
}

pub struct WorkerPool {
    name: &'static str,
    pool: ThreadPool,
    admitted: Arc<AtomicUsize>,
    limit: usize,
}

impl WorkerPool {
    pub fn new(
        name: &'static str,
        workers: usize,
        queue_depth: usize,
    ) -> Result<Self, ThreadPoolBuildError> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |i| format!("{}-{}", name, i))
            .stack_size(WORKER_STACK_SIZE)
            .panic_handler(move |_| {
                tracing::error!("task on {} pool panicked", name);
            })
            .build()?;

        Ok(Self {
            name,
            pool,
            admitted: Arc::new(AtomicUsize::new(0)),
            limit: workers + queue_depth,
        })
    }

    /// Run `task` on the pool, or inline if the pool is saturated.
    pub fn execute<F>(&self, task: F) -> Dispatch
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.try_admit() {
            task();
            return Dispatch::Inline;
        }

        let slot = Slot(Arc::clone(&self.admitted));
        self.pool.spawn(move || {
            let _slot = slot;
            task();
        });
        Dispatch::Queued
    }

    /// Tasks currently queued or running on the pool's own threads.
    pub fn admitted(&self) -> usize {
        self.admitted.load(Ordering::Acquire)
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn try_admit(&self) -> bool {
        self.admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .is_ok()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("workers", &self.workers())
            .field("limit", &self.limit)
            .finish()
    }
}

/// Releases an admission slot when the task finishes, including by panic.
struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
