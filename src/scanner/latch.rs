//! Completion latch for a tree of tasks.
//!
//! Every task holds a [`LatchGuard`] for as long as it runs. A task enters
//! the latch for each child before its own guard drops, so the count only
//! reaches zero once the whole tree has finished.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct CompletionLatch {
    pending: Mutex<usize>,
    idle: Condvar,
}

impl CompletionLatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one more outstanding task.
    pub fn enter(self: &Arc<Self>) -> LatchGuard {
        *self.lock() += 1;
        LatchGuard {
            latch: Arc::clone(self),
        }
    }

    /// Block until every registered task has finished.
    pub fn wait(&self) {
        let mut pending = self.lock();
        while *pending > 0 {
            pending = self
                .idle
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn pending(&self) -> usize {
        *self.lock()
    }

    fn leave(&self) {
        let mut pending = self.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One outstanding task. Dropping it, on success or unwind, marks the task done.
#[derive(Debug)]
pub struct LatchGuard {
    latch: Arc<CompletionLatch>,
}

impl LatchGuard {
    pub fn latch(&self) -> &Arc<CompletionLatch> {
        &self.latch
    }
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.latch.leave();
    }
}
