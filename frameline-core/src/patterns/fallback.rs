//! Fallback values for non-critical reads

use crate::error::AppResult;
use std::future::Future;
use tracing::warn;

/// Return the operation's value, or `fallback` if it fails.
///
/// Failures are absorbed and only logged; the result is always `Ok`.
pub async fn with_fallback<Fut, T>(operation: Fut, fallback: T) -> AppResult<T>
where
    Fut: Future<Output = AppResult<T>>,
{
    match operation.await {
        Ok(value) => Ok(value),
        Err(error) => {
            warn!(code = %error.code(), "Using fallback value after error: {}", error);
            Ok(fallback)
        }
    }
}
