use super::task::TaskId;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Runs task bodies, isolating panics and counting them.
pub(crate) struct PanicHandler {
    panic_count: AtomicUsize,
}

impl PanicHandler {
    pub fn new() -> Self {
        Self {
            panic_count: AtomicUsize::new(0),
        }
    }

    pub fn execute<F, R>(&self, f: F) -> Result<R, PanicInfo>
    where
        F: FnOnce() -> R,
    {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => Ok(result),
            Err(payload) => {
                self.panic_count.fetch_add(1, Ordering::Relaxed);
                Err(PanicInfo::from_payload(payload))
            }
        }
    }

    pub fn panic_count(&self) -> usize {
        self.panic_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for PanicHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanicHandler")
            .field("panic_count", &self.panic_count())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PanicInfo {
    pub message: String,
}

impl PanicInfo {
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };

        Self { message }
    }

    /// Formats the error record pushed to the pool's error queue.
    pub fn to_record(&self, task: TaskId, worker_index: usize) -> String {
        format!(
            "task {} panicked on worker {}: {}",
            task, worker_index, self.message
        )
    }

    /// Record for a batch completion callback that panicked.
    pub fn to_callback_record(&self, worker_index: usize) -> String {
        format!(
            "completion callback panicked on worker {}: {}",
            worker_index, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::task::Task;

    #[test]
    fn test_success_passes_through() {
        let handler = PanicHandler::new();

        let result = handler.execute(|| 42);

        assert_eq!(result.unwrap(), 42);
        assert_eq!(handler.panic_count(), 0);
    }

    #[test]
    fn test_str_and_string_payloads() {
        let handler = PanicHandler::new();

        let err = handler.execute(|| panic!("static message")).unwrap_err();
        assert_eq!(err.message, "static message");

        let code = 7;
        let err = handler.execute(|| panic!("formatted {}", code)).unwrap_err();
        assert_eq!(err.message, "formatted 7");

        assert_eq!(handler.panic_count(), 2);
    }

    #[test]
    fn test_opaque_payload() {
        let handler = PanicHandler::new();

        let err = handler
            .execute(|| std::panic::panic_any(17u32))
            .unwrap_err();

        assert_eq!(err.message, "unknown panic payload");
    }

    #[test]
    fn test_record_names_task_and_worker() {
        let task = Task::new(|_, _| {});
        let info = PanicInfo {
            message: "texture missing".to_string(),
        };

        let record = info.to_record(task.id, 3);

        assert!(record.starts_with(&format!("task {} ", task.id)));
        assert!(record.contains("worker 3"));
        assert!(record.ends_with("texture missing"));
    }

    #[test]
    fn test_callback_record() {
        let handler = PanicHandler::new();
        let info = handler.execute(|| panic!("batch finalize failed")).unwrap_err();

        assert_eq!(
            info.to_callback_record(1),
            "completion callback panicked on worker 1: batch finalize failed"
        );
    }
}
