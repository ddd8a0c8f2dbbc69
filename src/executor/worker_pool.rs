use super::panic_handler::PanicHandler;
use super::task::Task;
use super::worker::{Worker, WorkerId, WorkerState, WorkerStats};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::ErrorLogger;
use crate::util::Backoff;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, info, warn};

#[cfg(target_os = "linux")]
fn pin_thread_to_core(core_id: usize) {
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id, &mut cpuset);
        let result = libc::sched_setaffinity(
            0, // current thread
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpuset,
        );
        if result != 0 {
            warn!(core = core_id, "failed to pin worker thread");
        }
    }
}

/// Pool-wide state every worker reads.
pub(crate) struct PoolShared {
    alive: AtomicBool,
    worker_count: usize,
    // pushed but not yet finished
    in_flight: AtomicUsize,
    errors: Sender<String>,
}

impl PoolShared {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn record_error(&self, record: String) {
        // the receiver lives in the pool, which outlives every worker
        let _ = self.errors.send(record);
    }

    pub fn task_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct WorkerHandle {
    state: Arc<WorkerState>,
    thread: Option<JoinHandle<()>>,
    unparker: thread::Thread,
}

/// Fixed set of workers with least-loaded placement.
///
/// With fewer than two workers requested the pool is degraded: it owns no
/// threads, is never alive, and runs every task inline as `task(0, 1)`.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    shared: Arc<PoolShared>,
    errors: Receiver<String>,
    main_thread: ThreadId,
    inline_panics: PanicHandler,
}

impl WorkerPool {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let requested = config.worker_threads();
        let degraded = requested < 2;
        let num_threads = if degraded { 0 } else { requested };

        let (tx, rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(PoolShared {
            alive: AtomicBool::new(!degraded),
            worker_count: num_threads,
            in_flight: AtomicUsize::new(0),
            errors: tx,
        });

        let mut pool = Self {
            workers: Vec::with_capacity(num_threads),
            shared,
            errors: rx,
            main_thread: thread::current().id(),
            inline_panics: PanicHandler::new(),
        };

        if degraded {
            debug!(requested, "worker pool degraded, tasks run inline");
            return Ok(pool);
        }

        for id in 0..num_threads {
            // on error the partially built pool drops and joins what it spawned
            let handle = pool.spawn_worker(id, config)?;
            pool.workers.push(handle);
        }

        debug!(workers = num_threads, "worker pool started");
        Ok(pool)
    }

    fn spawn_worker(&self, id: WorkerId, config: &Config) -> Result<WorkerHandle> {
        let state = Arc::new(WorkerState::new(id));
        let worker = Worker::new(state.clone(), self.shared.clone());
        let name = format!("{}-{}", config.thread_name_prefix, id);

        let mut builder = thread::Builder::new().name(name);

        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let pin_workers = config.pin_workers;
        let thread = builder
            .spawn(move || {
                #[cfg(target_os = "linux")]
                if pin_workers {
                    pin_thread_to_core(id);
                }
                #[cfg(not(target_os = "linux"))]
                let _ = pin_workers;

                worker.run();
            })
            .map_err(|e| Error::executor(format!("spawn failed: {}", e)))?;

        let unparker = thread.thread().clone();

        Ok(WorkerHandle {
            state,
            thread: Some(thread),
            unparker,
        })
    }

    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.main_thread
    }

    pub fn is_alive(&self) -> bool {
        self.shared.is_alive()
    }

    /// Number of workers owned; 0 in degraded mode.
    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Lets tasks record extra error records, e.g. for a panicking callback.
    pub(crate) fn error_sink(&self) -> Arc<PoolShared> {
        self.shared.clone()
    }

    pub(crate) fn assign_task(&self, task: Task) {
        if !self.is_alive() {
            self.run_inline(task);
            return;
        }

        let worker = self.least_loaded();
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        worker.state.assign(task);
        worker.unparker.unpark();
    }

    pub(crate) fn assign_task_to_all_threads(&self, task: Task) {
        if !self.is_alive() {
            self.run_inline(task);
            return;
        }

        for worker in &self.workers {
            self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
            worker.state.assign(task.clone());
        }
        self.wake_all();
    }

    // ties go to the lowest index
    fn least_loaded(&self) -> &WorkerHandle {
        let mut best = &self.workers[0];
        let mut best_load = best.state.load();

        for worker in &self.workers[1..] {
            let load = worker.state.load();
            if load < best_load {
                best = worker;
                best_load = load;
            }
        }

        best
    }

    // degraded pools own no workers; a shut down pool still holds its handles
    fn run_inline(&self, task: Task) {
        assert!(self.workers.is_empty(), "task submitted after shutdown");

        if let Err(info) = self.inline_panics.execute(|| task.execute(0, 1)) {
            let record = info.to_record(task.id, 0);
            warn!(task = %task.id, "{}", record);
            self.shared.record_error(record);
        }
    }

    fn wake_all(&self) {
        for worker in &self.workers {
            worker.unparker.unpark();
        }
    }

    /// True when nothing is queued or executing anywhere in the pool.
    pub fn all_idle(&self) -> bool {
        self.shared.in_flight.load(Ordering::SeqCst) == 0
            && self.workers.iter().all(|w| w.state.is_idle())
    }

    /// Spins (with yielding backoff) until every worker is idle, then drains
    /// the error queue into `logger`. Returns the number of records logged.
    ///
    /// # Panics
    ///
    /// Panics when called from any thread other than the one that built the
    /// pool, or after [`shutdown`](Self::shutdown).
    pub fn wait_for_threads_to_finish(&self, logger: &dyn ErrorLogger) -> usize {
        assert!(
            self.is_main_thread(),
            "wait_for_threads_to_finish must be called from the main thread"
        );
        // abandoned tasks would keep the pool busy forever
        assert!(
            self.is_alive() || self.workers.is_empty(),
            "wait_for_threads_to_finish called after shutdown"
        );

        let backoff = Backoff::new();
        while !self.all_idle() {
            self.wake_all();
            backoff.snooze();
        }

        let mut logged = 0;
        for record in self.errors.try_iter() {
            logger.log_error(&record);
            logged += 1;
        }
        logged
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers.iter().map(|w| w.state.stats()).collect(),
            inline_panics: self.inline_panics.panic_count() as u64,
        }
    }

    /// Stops the workers and joins their threads. Tasks still queued are
    /// dropped unexecuted.
    pub fn shutdown(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);

        // wake everyone up to check the alive flag
        self.wake_all();

        let current = thread::current().id();
        let mut joined = 0;
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                // dropped from inside a task: this worker exits once the task returns
                if thread.thread().id() == current {
                    debug!(worker = worker.state.id, "pool dropped on its own worker, detaching");
                    continue;
                }
                if thread.join().is_err() {
                    warn!(worker = worker.state.id, "worker thread panicked outside a task");
                }
                joined += 1;
            }
        }

        if joined > 0 {
            info!(workers = joined, "worker pool shut down");
        }
    }

}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("alive", &self.is_alive())
            .field("main_thread", &self.main_thread)
            .finish()
    }
}

/// Snapshot of per-worker counters.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub workers: Vec<WorkerStats>,
    /// Panics caught while running tasks inline in degraded mode.
    pub inline_panics: u64,
}

impl PoolStats {
    pub fn total_executed(&self) -> u64 {
        self.workers.iter().map(|w| w.tasks_executed).sum()
    }

    pub fn total_panicked(&self) -> u64 {
        self.workers.iter().map(|w| w.tasks_panicked).sum::<u64>() + self.inline_panics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::time::Duration;

    fn pool_with(threads: usize) -> WorkerPool {
        let config = Config::builder().num_threads(threads).build().unwrap();
        WorkerPool::new(&config).unwrap()
    }

    fn discard(_: &str) {}

    #[test]
    fn test_pool_spawns_requested_workers() {
        let pool = pool_with(4);
        assert!(pool.is_alive());
        assert_eq!(pool.num_threads(), 4);
        assert!(pool.is_main_thread());
    }

    #[test]
    fn test_degraded_pool_runs_inline() {
        let pool = pool_with(1);
        assert!(!pool.is_alive());
        assert_eq!(pool.num_threads(), 0);

        let caller = thread::current().id();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        pool.assign_task(Task::new(move |index, count| {
            *seen_clone.lock() = Some((index, count, thread::current().id()));
        }));

        assert_eq!(*seen.lock(), Some((0, 1, caller)));
    }

    #[test]
    fn test_tasks_see_valid_indices() {
        let pool = pool_with(3);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..30 {
            let seen = seen.clone();
            pool.assign_task(Task::new(move |index, count| {
                seen.lock().push((index, count));
            }));
        }
        pool.wait_for_threads_to_finish(&discard);

        let seen = seen.lock();
        assert_eq!(seen.len(), 30);
        assert!(seen.iter().all(|&(index, count)| index < count && count == 3));
    }

    #[test]
    fn test_broadcast_reaches_every_worker_once() {
        let pool = pool_with(4);
        let indices = Arc::new(Mutex::new(Vec::new()));
        let indices_clone = indices.clone();

        pool.assign_task_to_all_threads(Task::new(move |index, _| {
            indices_clone.lock().push(index);
        }));
        pool.wait_for_threads_to_finish(&discard);

        let indices = indices.lock();
        assert_eq!(indices.len(), 4);
        let distinct: HashSet<_> = indices.iter().copied().collect();
        assert_eq!(distinct, (0..4).collect());
    }

    #[test]
    fn test_placement_prefers_least_loaded() {
        let pool = pool_with(2);
        let gate = Arc::new(AtomicBool::new(false));

        // occupy both workers so placement sees only queue load
        let gate_clone = gate.clone();
        pool.assign_task_to_all_threads(Task::new(move |_, _| {
            while !gate_clone.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
        }));

        for _ in 0..4 {
            pool.assign_task(Task::new(|_, _| {}));
        }
        let loads: Vec<_> = pool.workers.iter().map(|w| w.state.load()).collect();
        assert_eq!(loads, vec![3, 3]);

        gate.store(true, Ordering::SeqCst);
        pool.wait_for_threads_to_finish(&discard);
        assert_eq!(pool.stats().total_executed(), 6);
    }

    #[test]
    fn test_panics_become_error_records() {
        let pool = pool_with(2);
        pool.assign_task(Task::new(|_, _| panic!("shader compile failed")));
        pool.assign_task(Task::new(|_, _| {}));

        let records = Mutex::new(Vec::new());
        let logged = pool.wait_for_threads_to_finish(&|r: &str| records.lock().push(r.to_string()));

        assert_eq!(logged, 1);
        let records = records.lock();
        assert_eq!(records.len(), 1);
        assert!(records[0].contains("shader compile failed"));
        assert_eq!(pool.stats().total_panicked(), 1);
        assert!(pool.all_idle());
    }

    #[test]
    fn test_wait_rejects_non_main_thread() {
        let pool = pool_with(2);
        let result = thread::scope(|s| {
            s.spawn(|| pool.wait_for_threads_to_finish(&discard)).join()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_shutdown_joins_workers() {
        let mut pool = pool_with(3);
        pool.shutdown();

        assert!(!pool.is_alive());
        assert!(pool.workers.iter().all(|w| w.thread.is_none()));
    }

    #[test]
    #[should_panic(expected = "after shutdown")]
    fn test_wait_after_shutdown_is_rejected() {
        let mut pool = pool_with(2);
        pool.assign_task_to_all_threads(Task::new(|_, _| thread::sleep(Duration::from_millis(50))));
        pool.assign_task(Task::new(|_, _| {}));
        pool.shutdown();

        pool.wait_for_threads_to_finish(&discard);
    }

    #[test]
    fn test_degraded_pool_wait_after_shutdown() {
        let mut pool = pool_with(1);
        pool.shutdown();
        assert_eq!(pool.wait_for_threads_to_finish(&discard), 0);
    }

    #[test]
    #[should_panic(expected = "after shutdown")]
    fn test_rejects_tasks_after_shutdown() {
        let mut pool = pool_with(2);
        pool.shutdown();
        pool.assign_task(Task::new(|_, _| {}));
    }
}
