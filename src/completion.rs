//! Fan-out/join completion tracking.
//!
//! A [`CompletionTracker`] is shared by every task of one batch. Each task
//! reports completion exactly once; the task that brings the remaining count
//! to zero runs the batch callback on its own thread.

use crate::executor::CompletionCallback;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct CompletionTracker {
    remaining: AtomicUsize,
    callback: Mutex<Option<CompletionCallback>>,
}

impl CompletionTracker {
    /// Creates a tracker for a batch of `count` tasks.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn new(count: usize, callback: Option<CompletionCallback>) -> Arc<Self> {
        assert!(count > 0, "submit a batch with at least one task");

        Arc::new(Self {
            remaining: AtomicUsize::new(count),
            callback: Mutex::new(callback),
        })
    }

    /// Records one finished task. The call that observes the count reach zero
    /// runs the callback.
    ///
    /// # Panics
    ///
    /// Panics if every task of the batch has already reported.
    pub fn on_task_complete(&self) {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or_else(|_| panic!("on_task_complete called more times than the batch size"));

        if previous == 1 {
            let callback = self.callback.lock().take();
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}

impl std::fmt::Debug for CompletionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionTracker")
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Handle to a submitted batch, for waiting on that batch alone.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    tracker: Arc<CompletionTracker>,
}

impl BatchHandle {
    pub(crate) fn new(tracker: Arc<CompletionTracker>) -> Self {
        Self { tracker }
    }

    /// Tasks of the batch that have not finished yet.
    pub fn remaining(&self) -> usize {
        self.tracker.remaining()
    }

    pub fn is_complete(&self) -> bool {
        self.tracker.is_complete()
    }
}
