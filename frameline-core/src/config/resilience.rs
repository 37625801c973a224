//! Resilience configuration for store calls

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::defaults::*;
use super::{parse_duration_from_env, parse_duration_secs_from_env, parse_env};
use crate::error::{AppError, AppResult};

/// Retry, timeout, circuit breaker and bulkhead settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry: RetrySettings,

    /// Per-attempt deadline; `None` (`"0s"` in files) disables the timeout layer
    #[serde(with = "crate::config::optional_duration")]
    pub timeout: Option<Duration>,

    pub circuit_breaker: CircuitBreakerSettings,

    pub bulkhead: BulkheadSettings,
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub delay: Duration,

    /// Double the delay after every failed attempt
    pub exponential: bool,

    /// Cap for exponential delays; `"0s"` means uncapped
    #[serde(with = "crate::config::optional_duration")]
    pub max_delay: Option<Duration>,
}

/// Circuit breaker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,

    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,

    pub half_open_max_calls: u32,
}

/// Bulkhead settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkheadSettings {
    pub max_concurrency: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            timeout: Some(duration_secs(DEFAULT_OPERATION_TIMEOUT_SECS)),
            circuit_breaker: CircuitBreakerSettings::default(),
            bulkhead: BulkheadSettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            delay: duration_ms(DEFAULT_RETRY_DELAY_MS),
            exponential: DEFAULT_RETRY_EXPONENTIAL,
            max_delay: Some(duration_secs(DEFAULT_RETRY_MAX_DELAY_SECS)),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_CIRCUIT_FAILURE_THRESHOLD,
            reset_timeout: duration_secs(DEFAULT_CIRCUIT_RESET_TIMEOUT_SECS),
            half_open_max_calls: DEFAULT_CIRCUIT_HALF_OPEN_MAX_CALLS,
        }
    }
}

impl Default for BulkheadSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_BULKHEAD_MAX_CONCURRENCY,
        }
    }
}

impl ResilienceConfig {
    /// Load resilience configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(attempts) = parse_env("FRAMELINE_RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = attempts;
        }
        if let Some(delay) = parse_duration_from_env("FRAMELINE_RETRY_DELAY_MS")? {
            config.retry.delay = delay;
        }
        if let Some(exponential) = parse_env("FRAMELINE_RETRY_EXPONENTIAL")? {
            config.retry.exponential = exponential;
        }

        if let Some(timeout_ms) = parse_env::<u64>("FRAMELINE_TIMEOUT_MS")? {
            config.timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
        }

        if let Some(threshold) = parse_env("FRAMELINE_CIRCUIT_FAILURE_THRESHOLD")? {
            config.circuit_breaker.failure_threshold = threshold;
        }
        if let Some(reset) =
            parse_duration_secs_from_env("FRAMELINE_CIRCUIT_RESET_TIMEOUT_SECS")?
        {
            config.circuit_breaker.reset_timeout = reset;
        }

        if let Some(max) = parse_env("FRAMELINE_BULKHEAD_MAX_CONCURRENCY")? {
            config.bulkhead.max_concurrency = max;
        }

        Ok(config)
    }

    /// Validate resilience configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(AppError::config("retry.max_attempts must be at least 1"));
        }

        if let Some(max_delay) = self.retry.max_delay {
            if max_delay < self.retry.delay {
                return Err(AppError::config(
                    "retry.max_delay cannot be shorter than retry.delay",
                ));
            }
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err(AppError::config("timeout must be non-zero when set"));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(AppError::config(
                "circuit_breaker.failure_threshold must be at least 1",
            ));
        }

        if self.circuit_breaker.half_open_max_calls == 0 {
            return Err(AppError::config(
                "circuit_breaker.half_open_max_calls must be at least 1",
            ));
        }

        if self.bulkhead.max_concurrency == 0 {
            return Err(AppError::config("bulkhead.max_concurrency must be at least 1"));
        }

        Ok(())
    }
}
