//! Error constructor helpers
//!
//! Every `AppError` is built through these helpers so that `retryable` and the
//! default user message always come from the error code.

use super::types::*;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

impl AppError {
    /// Create an error for any code; retryability follows the code
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            user_message: code.default_user_message().to_string(),
            context: BTreeMap::new(),
            retryable: code.is_retryable(),
            source: None,
            timestamp: Utc::now(),
            detail: ErrorDetail::None,
        }
    }

    pub fn auth(code: AuthCode, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Auth(code), message)
    }

    pub fn database(code: DatabaseCode, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Database(code), message)
    }

    pub fn storage(code: StorageCode, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Storage(code), message)
    }

    pub fn network(code: NetworkCode, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network(code), message)
    }

    pub fn validation(code: ValidationCode, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation(code), message)
    }

    /// Validation error carrying per-field messages
    pub fn validation_fields(
        message: impl Into<String>,
        field_errors: BTreeMap<String, String>,
    ) -> Self {
        let mut error = Self::new(ErrorCode::Validation(ValidationCode::InvalidInput), message);
        error.detail = ErrorDetail::FieldErrors(field_errors);
        error
    }

    pub fn payment(code: PaymentCode, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Payment(code), message)
    }

    /// Payment error carrying per-field messages (card number, expiry, ...)
    pub fn payment_fields(
        code: PaymentCode,
        message: impl Into<String>,
        field_errors: BTreeMap<String, String>,
    ) -> Self {
        let mut error = Self::new(ErrorCode::Payment(code), message);
        error.detail = ErrorDetail::FieldErrors(field_errors);
        error
    }

    pub fn location(code: LocationCode, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Location(code), message)
    }

    /// Generic error for failures nothing else classified
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }

    /// Invalid or unreadable configuration
    pub fn config(message: impl Into<String>) -> Self {
        Self::validation(ValidationCode::InvalidConfig, message)
    }

    /// Document absent from the store
    pub fn not_found(resource: impl AsRef<str>) -> Self {
        Self::database(
            DatabaseCode::NotFound,
            format!("Resource not found: {}", resource.as_ref()),
        )
        .with_context("resource", resource.as_ref())
    }

    /// Synthetic error produced when an operation misses its deadline
    pub fn timeout(operation: impl AsRef<str>, duration: Duration) -> Self {
        Self::network(
            NetworkCode::Timeout,
            format!(
                "Operation timed out: {} after {:?}",
                operation.as_ref(),
                duration
            ),
        )
        .with_context("operation", operation.as_ref())
        .with_context("timeout_ms", duration.as_millis().to_string())
    }

    /// Partial failure of a batch.
    ///
    /// Retryable when at least one failed operation is retryable, so a caller
    /// can offer to retry the failed subset.
    pub fn aggregated(failures: Vec<OperationFailure>, success_count: usize) -> Self {
        let failure_count = failures.len();
        let retryable = failures.iter().any(|f| f.error.is_retryable());
        let operations = failures
            .iter()
            .map(|f| f.operation.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut error = Self::new(
            ErrorCode::Aggregated,
            format!(
                "{} of {} operations failed: {}",
                failure_count,
                failure_count + success_count,
                operations
            ),
        );
        error.retryable = retryable;
        error.detail = ErrorDetail::Aggregated {
            failures,
            success_count,
            failure_count,
        };
        error
    }

    /// Replace the user-facing message
    pub fn with_user_message(mut self, user_message: impl Into<String>) -> Self {
        self.user_message = user_message.into();
        self
    }

    /// Attach a context key; code and retryability are left untouched
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Keep the underlying error that caused this one
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }
}
