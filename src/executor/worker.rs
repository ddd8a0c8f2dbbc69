// worker thread stuff
use super::panic_handler::PanicHandler;
use super::task::Task;
use super::task_queue::TaskQueue;
use super::worker_pool::PoolShared;
use crate::util::CachePadded;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace, warn};

pub type WorkerId = usize;

thread_local! {
    static CURRENT_WORKER: Cell<Option<WorkerId>> = const { Cell::new(None) };
}

/// Index of the worker running the calling thread, if any.
pub(crate) fn current_worker() -> Option<WorkerId> {
    CURRENT_WORKER.with(|w| w.get())
}

// state shared between a worker thread and the pool
pub(crate) struct WorkerState {
    pub id: WorkerId,
    pub queue: TaskQueue,
    busy: CachePadded<AtomicBool>,
    // queued or executing
    pending: AtomicUsize,
    tasks_executed: AtomicU64,
    panics: PanicHandler,
}

impl WorkerState {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            queue: TaskQueue::new(),
            busy: CachePadded::new(AtomicBool::new(false)),
            pending: AtomicUsize::new(0),
            tasks_executed: AtomicU64::new(0),
            panics: PanicHandler::new(),
        }
    }

    pub fn assign(&self, task: Task) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.queue.push(task);
    }

    /// Placement weight: tasks queued plus the one executing.
    pub fn load(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && !self.is_busy()
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            index: self.id,
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            tasks_panicked: self.panics.panic_count() as u64,
            queued: self.queue.len(),
        }
    }
}

impl std::fmt::Debug for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerState")
            .field("id", &self.id)
            .field("queued", &self.queue.len())
            .field("busy", &self.is_busy())
            .finish()
    }
}

/// Point-in-time counters for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub index: WorkerId,
    /// Tasks that returned normally.
    pub tasks_executed: u64,
    pub tasks_panicked: u64,
    pub queued: usize,
}

pub(crate) struct Worker {
    state: Arc<WorkerState>,
    pool: Arc<PoolShared>,
}

impl Worker {
    pub fn new(state: Arc<WorkerState>, pool: Arc<PoolShared>) -> Self {
        Self { state, pool }
    }

    // main loop
    pub fn run(&self) {
        let id = self.state.id;
        CURRENT_WORKER.with(|w| w.set(Some(id)));
        debug!(worker = id, "worker started");

        while self.pool.is_alive() {
            self.state.busy.store(true, Ordering::SeqCst);
            self.drain();
            self.state.busy.store(false, Ordering::SeqCst);

            // unpark tokens are sticky, so a push racing with this check
            // makes park return immediately
            if self.pool.is_alive() && self.state.queue.is_empty() {
                thread::park();
            }
        }

        CURRENT_WORKER.with(|w| w.set(None));
        debug!(
            worker = id,
            abandoned = self.state.queue.len(),
            "worker stopped"
        );
    }

    // stops as soon as the pool dies; whatever is still queued is abandoned
    fn drain(&self) {
        while self.pool.is_alive() {
            match self.state.queue.pop() {
                Some(task) => self.execute_task(task),
                None => break,
            }
        }
    }

    fn execute_task(&self, task: Task) {
        let id = self.state.id;
        let worker_count = self.pool.worker_count();
        trace!(worker = id, task = %task.id, queued_for = ?task.age(), "running task");

        match self.state.panics.execute(|| task.execute(id, worker_count)) {
            Ok(()) => {
                self.state.tasks_executed.fetch_add(1, Ordering::Relaxed);
            }
            Err(info) => {
                let record = info.to_record(task.id, id);
                warn!(worker = id, task = %task.id, "{}", record);
                self.pool.record_error(record);
            }
        }

        self.state.pending.fetch_sub(1, Ordering::SeqCst);
        self.pool.task_finished();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_worker_is_idle() {
        let state = WorkerState::new(2);
        assert!(state.is_idle());
        assert_eq!(state.load(), 0);

        let stats = state.stats();
        assert_eq!(stats.index, 2);
        assert_eq!(stats.tasks_executed, 0);
        assert_eq!(stats.tasks_panicked, 0);
    }

    #[test]
    fn test_assign_counts_load() {
        let state = WorkerState::new(0);
        state.assign(Task::new(|_, _| {}));
        state.assign(Task::new(|_, _| {}));

        assert_eq!(state.load(), 2);
        assert_eq!(state.stats().queued, 2);
        assert!(!state.is_idle());
    }

    #[test]
    fn test_current_worker_off_pool() {
        assert_eq!(current_worker(), None);
    }
}
