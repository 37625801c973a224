//! Outermost error boundary
//!
//! Expected failures travel as `AppError`; anything that panics past that
//! contract is caught here and converted before it leaves the crate.

use super::types::{AppError, AppResult};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Run `future`, converting a panic into an `UNKNOWN_ERROR`
pub async fn catch_unexpected<F, T>(operation: &str, future: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!(operation, "Unexpected panic converted to error: {}", reason);
            Err(AppError::unknown(format!("Unexpected failure in {}: {}", operation, reason))
                .with_context("operation", operation))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn test_passes_results_through() {
        let result = catch_unexpected("noop", async { Ok::<_, AppError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_panic_becomes_unknown_error() {
        let trigger = true;
        let result: AppResult<()> = catch_unexpected("explode", async move {
            if trigger {
                panic!("boom");
            }
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unknown);
        assert!(!err.is_retryable());
        assert!(err.message().contains("boom"));
    }
}
