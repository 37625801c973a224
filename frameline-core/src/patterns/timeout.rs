//! Deadline enforcement for async operations
//!
//! [`with_timeout`] drops the losing future, which cancels it at its next
//! suspension point. Work the operation has already handed to another task is
//! not covered by that; [`with_cancellable_timeout`] passes the operation a
//! token that is cancelled when the deadline passes so it can stop such work
//! before side effects land.

use crate::error::{AppError, AppResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Race `operation` against a timer; a late result is discarded
pub async fn with_timeout<Fut, T>(operation: Fut, timeout: Duration) -> AppResult<T>
where
    Fut: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Operation timed out after {:?}", timeout);
            Err(AppError::timeout("operation", timeout))
        }
    }
}

/// Like [`with_timeout`], but the operation receives a cancellation token
pub async fn with_cancellable_timeout<F, Fut, T>(operation: F, timeout: Duration) -> AppResult<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();

    let result = tokio::time::timeout(timeout, operation(token.child_token())).await;
    match result {
        Ok(result) => {
            guard.disarm();
            result
        }
        Err(_) => {
            warn!("Operation timed out after {:?}; cancelling", timeout);
            drop(guard);
            Err(AppError::timeout("operation", timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, NetworkCode, ValidationCode};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_fast_operation_returns_own_result() {
        let result = with_timeout(
            async {
                sleep(Duration::from_millis(10)).await;
                Ok::<_, AppError>("done")
            },
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_failure_is_passed_through_unchanged() {
        let result: AppResult<()> = with_timeout(
            async { Err(AppError::validation(ValidationCode::InvalidInput, "bad")) },
            Duration::from_millis(50),
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation(ValidationCode::InvalidInput));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_times_out() {
        let result = with_timeout(
            async {
                sleep(Duration::from_millis(100)).await;
                Ok::<_, AppError>(1)
            },
            Duration::from_millis(50),
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Network(NetworkCode::Timeout));
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_spawned_work() {
        let landed = Arc::new(AtomicBool::new(false));
        let landed_in_task = landed.clone();

        let result: AppResult<()> = with_cancellable_timeout(
            move |token| async move {
                let worker = tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = sleep(Duration::from_millis(100)) => {
                            landed_in_task.store(true, Ordering::SeqCst);
                        }
                    }
                });
                let _ = worker.await;
                Ok(())
            },
            Duration::from_millis(20),
        )
        .await;

        assert!(result.is_err());
        sleep(Duration::from_millis(200)).await;
        assert!(!landed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_not_cancelled_on_success() {
        let result = with_cancellable_timeout(
            |token| async move { Ok::<_, AppError>(token.is_cancelled()) },
            Duration::from_millis(20),
        )
        .await;
        assert_eq!(result.unwrap(), false);
    }
}
