//! Composition of the recovery primitives
//!
//! [`with_recovery_strategies`] layers timeout, retry and fallback in that
//! order, innermost first: every attempt gets its own deadline and the
//! fallback only applies once retries are exhausted.
//!
//! [`RecoveryPolicy`] is the long-lived form repositories hold. It adds a
//! shared circuit breaker and bulkhead to the same layering:
//!
//! ```text
//! bulkhead ─▶ retry ─▶ circuit breaker ─▶ timeout ─▶ operation
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{with_fallback, with_retry, with_timeout, Bulkhead, CircuitBreaker, RetryConfig};
use super::{transient_failures_only, CircuitBreakerBuilder, CircuitBreakerState};
use crate::abstractions::Clock;
use crate::config::{ResilienceConfig, RetrySettings};
use crate::error::AppResult;

/// Options for [`with_recovery_strategies`]; every layer is optional
pub struct RecoveryOptions<T> {
    pub retry: Option<RetryConfig>,
    pub timeout: Option<Duration>,
    pub fallback: Option<T>,
}

impl<T> Default for RecoveryOptions<T> {
    fn default() -> Self {
        Self {
            retry: None,
            timeout: None,
            fallback: None,
        }
    }
}

impl<T> RecoveryOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn fallback(mut self, value: T) -> Self {
        self.fallback = Some(value);
        self
    }
}

/// Run `operation` under timeout → retry → fallback
pub async fn with_recovery_strategies<F, Fut, T>(
    mut operation: F,
    options: RecoveryOptions<T>,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let RecoveryOptions {
        retry,
        timeout,
        fallback,
    } = options;

    let attempt = || {
        let fut = operation();
        async move {
            match timeout {
                Some(timeout) => with_timeout(fut, timeout).await,
                None => fut.await,
            }
        }
    };

    let retried = async move {
        match retry {
            Some(config) => with_retry(attempt, &config).await,
            None => {
                let mut attempt = attempt;
                attempt().await
            }
        }
    };

    match fallback {
        Some(fallback) => with_fallback(retried, fallback).await,
        None => retried.await,
    }
}

/// Shared resilience settings applied around every store call of a component
#[derive(Clone, Default)]
pub struct RecoveryPolicy {
    pub retry: Option<RetryConfig>,
    pub timeout: Option<Duration>,
    pub circuit_breaker: Option<Arc<CircuitBreaker>>,
    pub bulkhead: Option<Arc<Bulkhead>>,
}

impl RecoveryPolicy {
    /// Policy that runs operations unchanged
    pub fn none() -> Self {
        Self::default()
    }

    /// Build every layer from configuration
    ///
    /// The breaker only counts retryable failures, so not-found reads and
    /// rejected writes never open the circuit.
    pub fn from_config(name: &str, config: &ResilienceConfig, clock: Arc<dyn Clock>) -> Self {
        let breaker = CircuitBreakerBuilder::new(name)
            .error_predicate(transient_failures_only)
            .failure_threshold(config.circuit_breaker.failure_threshold)
            .reset_timeout(config.circuit_breaker.reset_timeout)
            .half_open_max_calls(config.circuit_breaker.half_open_max_calls)
            .clock(clock)
            .build();

        Self {
            retry: Some(RetryConfig::from(&config.retry).with_operation_name(name)),
            timeout: config.timeout,
            circuit_breaker: Some(Arc::new(breaker)),
            bulkhead: Some(Arc::new(Bulkhead::new(name, config.bulkhead.max_concurrency))),
        }
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    pub fn with_bulkhead(mut self, bulkhead: Arc<Bulkhead>) -> Self {
        self.bulkhead = Some(bulkhead);
        self
    }

    /// Current breaker state, if a breaker is configured
    pub fn circuit_state(&self) -> Option<CircuitBreakerState> {
        self.circuit_breaker.as_ref().map(|breaker| breaker.state())
    }

    /// Run `operation` through every configured layer
    pub async fn run<F, Fut, T>(&self, operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        match &self.bulkhead {
            Some(bulkhead) => bulkhead.execute(|| self.run_retrying(operation)).await,
            None => self.run_retrying(operation).await,
        }
    }

    async fn run_retrying<F, Fut, T>(&self, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let attempt = || self.guarded(operation());
        match &self.retry {
            Some(config) => with_retry(attempt, config).await,
            None => {
                let mut attempt = attempt;
                attempt().await
            }
        }
    }

    async fn guarded<Fut, T>(&self, fut: Fut) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
    {
        let timeout = self.timeout;
        let timed = async move {
            match timeout {
                Some(timeout) => with_timeout(fut, timeout).await,
                None => fut.await,
            }
        };

        match &self.circuit_breaker {
            Some(breaker) => {
                debug!("Routing call through circuit breaker '{}'", breaker.name());
                breaker.execute(|| timed).await
            }
            None => timed.await,
        }
    }
}

impl std::fmt::Debug for RecoveryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryPolicy")
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("circuit_breaker", &self.circuit_breaker.as_ref().map(|b| b.name().to_string()))
            .field("bulkhead", &self.bulkhead.as_ref().map(|b| b.max_concurrency()))
            .finish()
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        let config = RetryConfig::new(settings.max_attempts, settings.delay, settings.exponential);
        match settings.max_delay {
            Some(max_delay) => config.with_max_delay(max_delay),
            None => config,
        }
    }
}
