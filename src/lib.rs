//! A fixed-size worker pool for short, fire-and-forget tasks.
//!
//! Tasks are closures called with `(worker_index, worker_count)`. They are
//! submitted from the main thread, placed on the least-loaded worker, and may
//! be grouped into batches that fire a single completion callback once every
//! task of the batch has run. Panics inside task bodies are caught by the
//! worker, turned into error records, and handed to an [`ErrorLogger`] when
//! the main thread waits for the pool to go idle.
//!
//! # Quick Start
//!
//! ```no_run
//! use job_system::prelude::*;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let jobs = JobSystem::initialize(Config::default()).unwrap();
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! let tasks: Vec<_> = (0..8)
//!     .map(|_| {
//!         let hits = hits.clone();
//!         move |_worker: usize, _workers: usize| {
//!             hits.fetch_add(1, Ordering::Relaxed);
//!         }
//!     })
//!     .collect();
//!
//! jobs.assign_tasks(tasks, Some(Box::new(|| println!("batch done"))));
//! jobs.wait_for_threads_to_finish();
//!
//! jobs.shutdown();
//! ```
//!
//! # Degraded mode
//!
//! With fewer than two workers (detected or configured) the pool spawns no
//! threads and every submission runs synchronously on the caller as
//! `task(0, 1)`.

#![warn(missing_debug_implementations)]

pub mod completion;
pub mod config;
pub mod error;
pub mod executor;
pub mod job_system;
pub mod logging;
pub mod prelude;
pub(crate) mod util;

// Re-export key types at crate root
pub use completion::{BatchHandle, CompletionTracker};
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use executor::{CompletionCallback, PoolStats, WorkerStats};
pub use job_system::JobSystem;
pub use logging::{ErrorLogger, TracingLogger};
