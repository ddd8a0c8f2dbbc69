//! Task execution infrastructure.
//!
//! Workers, their task queues, and the fixed-size pool that places tasks on
//! the least-loaded worker.

pub(crate) mod panic_handler;
pub(crate) mod task;
pub(crate) mod task_queue;
pub(crate) mod worker;
pub(crate) mod worker_pool;

pub use task::CompletionCallback;
pub use worker::{WorkerId, WorkerStats};
pub use worker_pool::{PoolStats, WorkerPool};

pub(crate) use task::Task;
