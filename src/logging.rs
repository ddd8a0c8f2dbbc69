//! Where collected task error records end up.

/// Receives formatted error records, one call per record, on the main thread
/// during [`JobSystem::wait_for_threads_to_finish`](crate::JobSystem::wait_for_threads_to_finish).
pub trait ErrorLogger: Send + Sync {
    fn log_error(&self, record: &str);
}

impl<F> ErrorLogger for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log_error(&self, record: &str) {
        self(record)
    }
}

/// Default logger: one `tracing` error event per record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ErrorLogger for TracingLogger {
    fn log_error(&self, record: &str) {
        tracing::error!(target: "job_system", "{}", record);
    }
}
