//! Public entry point for submitting work.

use crate::completion::{BatchHandle, CompletionTracker};
use crate::config::Config;
use crate::error::Result;
use crate::executor::panic_handler::PanicInfo;
use crate::executor::worker::current_worker;
use crate::executor::{CompletionCallback, PoolStats, Task, WorkerPool};
use crate::logging::{ErrorLogger, TracingLogger};
use crate::util::Backoff;
use std::ops::Range;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Handle to the worker pool.
///
/// `initialize` builds the pool and records the calling thread as the main
/// thread; `shutdown` consumes the handle, so the pool can neither be used
/// before it exists nor shut down twice.
pub struct JobSystem {
    pool: WorkerPool,
    logger: Arc<dyn ErrorLogger>,
}

impl JobSystem {
    /// Starts the pool, forwarding task errors to [`TracingLogger`].
    pub fn initialize(config: Config) -> Result<Self> {
        Self::initialize_with_logger(config, TracingLogger)
    }

    pub fn initialize_with_logger<L>(config: Config, logger: L) -> Result<Self>
    where
        L: ErrorLogger + 'static,
    {
        let pool = WorkerPool::new(&config)?;
        Ok(Self {
            pool,
            logger: Arc::new(logger),
        })
    }

    /// Stops every worker and joins it. Tasks not yet started are abandoned.
    pub fn shutdown(mut self) {
        self.pool.shutdown();
    }

    /// Submits one task; `on_complete` runs after it returns or panics.
    pub fn assign_task<F>(&self, task: F, on_complete: Option<CompletionCallback>) -> BatchHandle
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.assign_tasks(std::iter::once(task), on_complete)
    }

    /// Submits a batch; `on_complete` runs exactly once, after every task of
    /// the batch has returned or panicked, on whichever worker finished last.
    ///
    /// # Panics
    ///
    /// Panics if `tasks` is empty.
    pub fn assign_tasks<I, F>(&self, tasks: I, on_complete: Option<CompletionCallback>) -> BatchHandle
    where
        I: IntoIterator<Item = F>,
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        let tasks: Vec<F> = tasks.into_iter().collect();
        let tracker = CompletionTracker::new(tasks.len(), on_complete);

        for task in tasks {
            let tracker = tracker.clone();
            let errors = self.pool.error_sink();
            self.pool.assign_task(Task::new(move |index, count| {
                let body = catch_unwind(AssertUnwindSafe(|| task(index, count)));
                let completion = catch_unwind(AssertUnwindSafe(|| tracker.on_task_complete()));

                // the worker turns a re-raised panic into the task's error record
                match (body, completion) {
                    (Ok(()), Ok(())) => {}
                    (Err(payload), Ok(())) | (Ok(()), Err(payload)) => resume_unwind(payload),
                    (Err(payload), Err(callback_payload)) => {
                        let info = PanicInfo::from_payload(callback_payload);
                        errors.record_error(info.to_callback_record(index));
                        resume_unwind(payload);
                    }
                }
            }));
        }

        BatchHandle::new(tracker)
    }

    /// Splits `0..set_size` into ranges of at least `min_range` elements
    /// (one per worker when the set is large enough) and submits them as one
    /// batch. `func` is called with a range and the executing worker's index.
    ///
    /// # Panics
    ///
    /// Panics if `set_size` is zero.
    pub fn assign_task_set<F>(
        &self,
        set_size: usize,
        min_range: usize,
        func: F,
        on_complete: Option<CompletionCallback>,
    ) -> BatchHandle
    where
        F: Fn(Range<usize>, usize) + Send + Sync + 'static,
    {
        assert!(set_size > 0, "submit a task set with at least one element");

        let func = Arc::new(func);
        let ranges = partition(set_size, min_range, self.number_of_available_threads());
        let tasks = ranges.into_iter().map(|range| {
            let func = func.clone();
            move |index: usize, _: usize| (*func)(range.clone(), index)
        });

        self.assign_tasks(tasks, on_complete)
    }

    /// [`assign_task_set`](Self::assign_task_set) followed by
    /// [`wait_for_batch`](Self::wait_for_batch).
    pub fn assign_task_set_and_wait<F>(&self, set_size: usize, min_range: usize, func: F)
    where
        F: Fn(Range<usize>, usize) + Send + Sync + 'static,
    {
        let batch = self.assign_task_set(set_size, min_range, func, None);
        self.wait_for_batch(&batch);
    }

    /// Submits a batch and blocks the main thread until all of it has run.
    /// Error records stay queued until the next
    /// [`wait_for_threads_to_finish`](Self::wait_for_threads_to_finish).
    ///
    /// # Panics
    ///
    /// Panics off the main thread or if `tasks` is empty.
    pub fn assign_tasks_and_wait<I, F>(&self, tasks: I)
    where
        I: IntoIterator<Item = F>,
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        let batch = self.assign_tasks(tasks, None);
        self.wait_for_batch(&batch);
    }

    /// Blocks the main thread until every task of `batch` has returned or
    /// panicked. Unrelated work may still be running afterwards.
    ///
    /// # Panics
    ///
    /// Panics off the main thread.
    pub fn wait_for_batch(&self, batch: &BatchHandle) {
        assert!(
            self.is_main_thread(),
            "wait_for_batch must be called from the main thread"
        );

        let backoff = Backoff::new();
        while !batch.is_complete() {
            backoff.snooze();
        }
    }

    /// Runs `task` once on every worker, each with its own index. No
    /// completion tracking; follow with `wait_for_threads_to_finish` to join.
    pub fn assign_task_to_all_threads<F>(&self, task: F)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.pool.assign_task_to_all_threads(Task::new(task));
    }

    /// Number of workers; 0 when the pool is degraded.
    pub fn number_of_available_threads(&self) -> usize {
        self.pool.num_threads()
    }

    /// Blocks until the whole pool is idle, then forwards every queued error
    /// record to the logger. Returns how many records were forwarded.
    ///
    /// # Panics
    ///
    /// Panics off the main thread.
    pub fn wait_for_threads_to_finish(&self) -> usize {
        self.pool.wait_for_threads_to_finish(self.logger.as_ref())
    }

    pub fn is_main_thread(&self) -> bool {
        self.pool.is_main_thread()
    }

    /// Index of the worker the caller is running on, `None` off-pool.
    pub fn current_worker_index() -> Option<usize> {
        current_worker()
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

impl std::fmt::Debug for JobSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSystem").field("pool", &self.pool).finish()
    }
}

// one range per worker, none shorter than min_range (except the tail)
fn partition(set_size: usize, min_range: usize, workers: usize) -> Vec<Range<usize>> {
    let parts = workers.max(1);
    let chunk = ((set_size + parts - 1) / parts).max(min_range.max(1));

    (0..set_size)
        .step_by(chunk)
        .map(|start| start..(start + chunk).min(set_size))
        .collect()
}
