//! Retry and backoff patterns for handling transient failures
//!
//! An attempt is retried only when the error it returned is marked retryable.
//! The classification belongs to the error; this module never overrides it.

use crate::error::{AppError, AppResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff strategy for retry operations
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// `base * 2^(attempt-1)`, optionally capped
    Exponential { base: Duration, max: Option<Duration> },
}

impl BackoffStrategy {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(duration) => *duration,
            BackoffStrategy::Exponential { base, max } => {
                let exponent = attempt.saturating_sub(1).min(31);
                let delay = base.saturating_mul(1u32 << exponent);
                match max {
                    Some(max) => delay.min(*max),
                    None => delay,
                }
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential {
            base: Duration::from_millis(1000),
            max: None,
        }
    }
}

/// Jitter strategy for retry delays
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JitterStrategy {
    /// Delays are exactly what the backoff computes
    #[default]
    None,
    /// Random delay between 0 and the computed delay
    Full,
    /// Multiply the delay by a random factor in `min..max`
    Proportional { min: f64, max: f64 },
}

impl JitterStrategy {
    fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                let max_ms = delay.as_millis() as u64;
                if max_ms == 0 {
                    delay
                } else {
                    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
                }
            }
            JitterStrategy::Proportional { min, max } => {
                if max <= min {
                    return delay;
                }
                let factor = rand::thread_rng().gen_range(*min..*max);
                Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
            }
        }
    }
}

/// Configuration for retry operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial attempt)
    pub max_attempts: u32,
    /// Backoff strategy to use
    pub backoff: BackoffStrategy,
    /// Jitter applied on top of the backoff
    pub jitter: JitterStrategy,
    /// Per-operation identifier for better observability
    pub operation_name: Option<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
            jitter: JitterStrategy::None,
            operation_name: None,
        }
    }
}

impl RetryConfig {
    /// `{maxAttempts, delayMs, exponential}` form
    pub fn new(max_attempts: u32, delay: Duration, exponential: bool) -> Self {
        if exponential {
            Self::exponential(max_attempts, delay)
        } else {
            Self::fixed(max_attempts, delay)
        }
    }

    /// Create a simple fixed delay retry config
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: attempts,
            backoff: BackoffStrategy::Fixed(delay),
            ..Default::default()
        }
    }

    /// Create an exponential backoff retry config
    pub fn exponential(attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts: attempts,
            backoff: BackoffStrategy::Exponential { base, max: None },
            ..Default::default()
        }
    }

    /// Cap exponential delays
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        if let BackoffStrategy::Exponential { max, .. } = &mut self.backoff {
            *max = Some(max_delay);
        }
        self
    }

    /// Set operation name for better observability
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Set custom jitter strategy
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the attempt following `failed_attempt`
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.jitter.apply(self.backoff.delay(failed_attempt))
    }
}

/// Retry an async operation with the given configuration
pub async fn with_retry<F, Fut, T>(operation: F, config: &RetryConfig) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    with_retry_notify(operation, config, |_, _, _| {}).await
}

/// Like [`with_retry`], calling `on_retry(attempt, error, delay)` before each wait
pub async fn with_retry_notify<F, Fut, T, N>(
    mut operation: F,
    config: &RetryConfig,
    mut on_retry: N,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
    N: FnMut(u32, &AppError, Duration),
{
    let max_attempts = config.max_attempts.max(1);
    let name = config.operation_name.as_deref().unwrap_or("operation");
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded after {} attempts", name, attempt);
                }
                return Ok(value);
            }
            Err(error) => {
                if !error.is_retryable() {
                    debug!("{}: error is not retryable: {}", name, error);
                    return Err(error);
                }

                if attempt >= max_attempts {
                    warn!("{}: max retry attempts ({}) reached", name, max_attempts);
                    return Err(error);
                }

                let delay = config.delay_after(attempt);
                warn!(
                    "Retry attempt {}/{} for {} after error: {} (waiting {:?})",
                    attempt, max_attempts, name, error, delay
                );
                on_retry(attempt, &error, delay);

                sleep(delay).await;
            }
        }
    }
}
