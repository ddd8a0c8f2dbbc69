//! Recoverable errors.
//!
//! Contract violations (wrong calling thread, empty batch, over-completing a
//! tracker) are not represented here: they panic on the violating thread.
//! Panics raised inside task bodies are not represented here either; they are
//! turned into error records and handed to the [`ErrorLogger`](crate::ErrorLogger).

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("num_threads too large");
        assert_eq!(err.to_string(), "config error: num_threads too large");

        let err = Error::executor("spawn failed: out of memory");
        assert_eq!(err.to_string(), "executor error: spawn failed: out of memory");
    }
}
