//! Task representation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global task ID counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Body of a task: called with `(worker_index, worker_count)`.
pub(crate) type TaskFn = dyn Fn(usize, usize) + Send + Sync + 'static;

/// Invoked once after every task of a batch has returned.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Internal task representation.
///
/// Cloning shares the body; a task broadcast to every worker is one `Task`
/// cloned into each queue.
#[derive(Clone)]
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) func: Arc<TaskFn>,
    pub(crate) spawn_time: Instant,
}

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        Task {
            id: TaskId::next(),
            func: Arc::new(f),
            spawn_time: Instant::now(),
        }
    }

    pub fn execute(&self, worker_index: usize, worker_count: usize) {
        (self.func)(worker_index, worker_count);
    }

    /// Time since the task was created
    pub fn age(&self) -> Duration {
        self.spawn_time.elapsed()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("spawn_time", &self.spawn_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_task_ids_are_unique() {
        let a = Task::new(|_, _| {});
        let b = Task::new(|_, _| {});
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_clone_shares_body() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let task = Task::new(move |index, count| {
            assert!(index < count);
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        let copy = task.clone();
        assert_eq!(copy.id, task.id);

        task.execute(0, 2);
        copy.execute(1, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
