pub use crate::completion::{BatchHandle, CompletionTracker};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Error, Result};
pub use crate::executor::{CompletionCallback, PoolStats, WorkerStats};
pub use crate::job_system::JobSystem;
pub use crate::logging::{ErrorLogger, TracingLogger};
