//! Per-worker pending task queue.

use super::task::Task;
use crossbeam_deque::{Injector, Steal};

/// Unbounded FIFO of pending tasks owned by one worker.
///
/// Any thread may push; by convention only the owning worker pops.
pub(crate) struct TaskQueue {
    inner: Injector<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Injector::new(),
        }
    }

    /// Appends at the tail. Never blocks.
    pub fn push(&self, task: Task) {
        self.inner.push(task);
    }

    /// Removes the head, or `None` if the queue is currently empty.
    pub fn pop(&self) -> Option<Task> {
        loop {
            match self.inner.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    /// Approximate length; may be stale under concurrent mutation.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue").field("len", &self.len()).finish()
    }
}
