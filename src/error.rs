use thiserror::Error;
use tracing::{error, warn};

/// Domain-specific errors for the scriptlet runner
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Process spawn failed: {0}")]
    ProcessSpawn(String),

    #[error("An execution is already in progress")]
    AlreadyRunning,

    #[error("Script not found in catalog: {path}")]
    ScriptNotFound { path: String },

    #[error("Invalid path encoding: {0}")]
    InvalidPath(String),

    #[error("Failed to read script '{path}': {source}")]
    ScriptRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Failed to parse stored value: {0}")]
    StoreParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the caller doesn't need the error.
///
/// # Examples
///
/// ```ignore
/// use scriptlet_runner::error::ResultExt;
///
/// // Silently log and continue if history fails to persist
/// history.save().log_err();
///
/// // Log as warning for expected failures
/// let settings = store.load().warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_err_passes_through_ok() {
        let result: std::result::Result<i32, String> = Ok(42);
        assert_eq!(result.log_err(), Some(42));
    }

    #[test]
    fn test_log_err_swallows_err() {
        let result: std::result::Result<i32, String> = Err("boom".to_string());
        assert_eq!(result.log_err(), None);
    }

    #[test]
    fn test_error_display() {
        let err = RunnerError::ScriptNotFound {
            path: "/tmp/gone.sh".to_string(),
        };
        assert_eq!(err.to_string(), "Script not found in catalog: /tmp/gone.sh");

        let err = RunnerError::AlreadyRunning;
        assert_eq!(err.to_string(), "An execution is already in progress");
    }
}
