//! Context helpers for `AppResult`
//!
//! Adding context never changes an error's code or retryability; it only
//! records where the failure surfaced.

use super::types::{AppError, AppResult};

/// Trait for adding context to errors
pub trait ErrorContext<T> {
    /// Record the operation that was being performed
    fn operation(self, operation: &str) -> AppResult<T>;

    /// Add a key/value pair computed lazily on the error path
    fn with_context<F>(self, key: &str, f: F) -> AppResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for AppResult<T> {
    fn operation(self, operation: &str) -> AppResult<T> {
        self.map_err(|e| e.with_context("operation", operation))
    }

    fn with_context<F>(self, key: &str, f: F) -> AppResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(key, f()))
    }
}

/// Log failures as they pass through, unchanged
pub trait ResultLogging<T> {
    /// Log an error at warn level and return the result as is
    fn log_if_error(self, context: &str) -> AppResult<T>;
}

impl<T> ResultLogging<T> for AppResult<T> {
    fn log_if_error(self, context: &str) -> AppResult<T> {
        if let Err(ref e) = self {
            tracing::warn!(code = %e.code(), retryable = e.is_retryable(), "{}: {}", context, e);
        }
        self
    }
}

/// Extension trait for Options to convert to errors with context
pub trait OptionContext<T> {
    /// Convert None to a not-found error
    fn or_not_found(self, resource: &str) -> AppResult<T>;
}

impl<T> OptionContext<T> for Option<T> {
    fn or_not_found(self, resource: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::not_found(resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatabaseCode, ErrorCode};

    #[test]
    fn test_context_preserves_classification() {
        let result: AppResult<()> =
            Err(AppError::database(DatabaseCode::Unavailable, "backend down"));
        let err = result.operation("load_list").unwrap_err();

        assert_eq!(err.code(), ErrorCode::Database(DatabaseCode::Unavailable));
        assert!(err.is_retryable());
        assert_eq!(err.context().get("operation").map(String::as_str), Some("load_list"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn test_log_if_error_leaves_result_untouched() {
        let result: AppResult<()> = Err(AppError::database(DatabaseCode::WriteFailed, "disk full"));
        let err = result.log_if_error("create kit list").unwrap_err();

        assert_eq!(err.code(), ErrorCode::Database(DatabaseCode::WriteFailed));
        assert!(err.is_retryable());
        assert!(logs_contain("create kit list"));
        assert!(logs_contain("DB_WRITE_FAILED"));

        let ok: AppResult<u32> = Ok(3);
        assert_eq!(ok.log_if_error("unused").unwrap(), 3);
        assert!(!logs_contain("unused"));
    }

    #[test]
    fn test_option_not_found() {
        let value: Option<u32> = None;
        let err = value.or_not_found("users/u1").unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }
}
