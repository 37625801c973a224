//! Circuit Breaker Pattern for Fault Tolerance
//!
//! The circuit breaker stops calling a dependency that keeps failing, and
//! periodically lets a probe through to see whether it has recovered.
//!
//! ## States
//!
//! - **Closed**: Normal operation, calls pass through
//! - **Open**: Failing fast, calls are rejected without invoking the operation
//! - **Half-Open**: Reset timeout elapsed, a probe call is allowed through
//!
//! Transitions: Closed → Open after `failure_threshold` consecutive failures;
//! Open → Half-Open on the first call after `reset_timeout`; Half-Open → Closed
//! on the next success; Half-Open → Open on the next failure (the failure
//! counter keeps accumulating until a success resets it).
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use frameline_core::patterns::CircuitBreakerBuilder;
//! use frameline_core::error::AppError;
//!
//! # async fn example() {
//! let breaker = CircuitBreakerBuilder::new("document-store")
//!     .failure_threshold(5)
//!     .reset_timeout(Duration::from_secs(30))
//!     .build();
//!
//! let result = breaker.execute(|| async { Ok::<_, AppError>(42) }).await;
//! assert_eq!(result.unwrap(), 42);
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::abstractions::{Clock, Instant, SystemClock};
use crate::error::{AppError, AppResult, NetworkCode};

/// Where the breaker is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    /// Normal operation - calls pass through
    Closed,
    /// Failing fast - calls are rejected immediately
    Open,
    /// Testing if the dependency has recovered
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerState::Closed => write!(f, "closed"),
            CircuitBreakerState::Open => write!(f, "open"),
            CircuitBreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Thresholds and trip rules for one breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive tripping failures that open the breaker
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a probe
    pub reset_timeout: Duration,
    /// Probe calls admitted concurrently while Half-Open
    pub half_open_max_calls: u32,
    /// Which failures count towards opening the circuit
    pub is_circuit_breaking_error: fn(&AppError) -> bool,
    /// Log every state change
    pub enable_logging: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
            is_circuit_breaking_error: every_failure,
            enable_logging: true,
        }
    }
}

/// Default predicate: every failed call counts
fn every_failure(_error: &AppError) -> bool {
    true
}

/// Predicate that only counts retryable (transient) failures
pub fn transient_failures_only(error: &AppError) -> bool {
    error.is_retryable()
}

/// Counters since creation or the last reset
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitBreakerState,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Calls rejected without invoking the operation
    pub rejected_calls: u64,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<Instant>,
    pub last_opened_at: Option<Instant>,
}

struct CircuitBreakerInternalState {
    state: CircuitBreakerState,
    consecutive_failures: u32,
    half_open_calls: u32,
    last_failure_at: Option<Instant>,
    last_opened_at: Option<Instant>,
}

impl CircuitBreakerInternalState {
    fn closed() -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            consecutive_failures: 0,
            half_open_calls: 0,
            last_failure_at: None,
            last_opened_at: None,
        }
    }
}

enum Admission {
    Normal,
    Probe,
    Rejected,
}

/// Circuit breaker guarding one dependency
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    internal_state: Mutex<CircuitBreakerInternalState>,

    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    rejected_calls: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker using the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, SystemClock::shared())
    }

    /// Create a new circuit breaker reading time from `clock`
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            internal_state: Mutex::new(CircuitBreakerInternalState::closed()),
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
        }
    }

    /// Run `operation` unless the breaker is open
    pub async fn execute<F, Fut, T>(&self, operation: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let probe = match self.admit() {
            Admission::Rejected => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                debug!("Circuit breaker '{}' rejected call", self.name);
                return Err(AppError::network(
                    NetworkCode::CircuitOpen,
                    format!("Circuit breaker '{}' is open", self.name),
                )
                .with_context("circuit", self.name.as_str()));
            }
            Admission::Normal => false,
            Admission::Probe => true,
        };

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let mut slot = ProbeSlot {
            breaker: self,
            armed: probe,
        };

        let result = operation().await;
        slot.armed = false;

        match &result {
            Ok(_) => self.on_success(),
            Err(e) if (self.config.is_circuit_breaking_error)(e) => self.on_failure(),
            Err(e) => {
                debug!(
                    "Circuit breaker '{}': non-circuit-breaking error: {}",
                    self.name, e
                );
                if probe {
                    self.release_probe();
                }
            }
        }

        result
    }

    fn admit(&self) -> Admission {
        let mut state = self.internal_state.lock();

        match state.state {
            CircuitBreakerState::Closed => Admission::Normal,
            CircuitBreakerState::Open => {
                let now = self.clock.now();
                let ready = state
                    .last_opened_at
                    .map(|opened_at| now.duration_since(opened_at) >= self.config.reset_timeout)
                    .unwrap_or(true);
                if ready {
                    state.state = CircuitBreakerState::HalfOpen;
                    state.half_open_calls = 1;
                    if self.config.enable_logging {
                        info!("Circuit breaker '{}' transitioning to half-open", self.name);
                    }
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            CircuitBreakerState::HalfOpen => {
                if state.half_open_calls < self.config.half_open_max_calls {
                    state.half_open_calls += 1;
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    fn on_success(&self) {
        self.successful_calls.fetch_add(1, Ordering::Relaxed);

        let mut state = self.internal_state.lock();
        state.consecutive_failures = 0;

        if state.state == CircuitBreakerState::HalfOpen {
            state.state = CircuitBreakerState::Closed;
            state.half_open_calls = 0;
            if self.config.enable_logging {
                info!("Circuit breaker '{}' closing after successful probe", self.name);
            }
        }
    }

    fn on_failure(&self) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);

        let now = self.clock.now();
        let mut state = self.internal_state.lock();
        state.consecutive_failures += 1;
        state.last_failure_at = Some(now);

        match state.state {
            CircuitBreakerState::HalfOpen => {
                state.state = CircuitBreakerState::Open;
                state.last_opened_at = Some(now);
                state.half_open_calls = 0;
                if self.config.enable_logging {
                    warn!(
                        "Circuit breaker '{}' reopening after failure in half-open state",
                        self.name
                    );
                }
            }
            CircuitBreakerState::Closed
                if state.consecutive_failures >= self.config.failure_threshold =>
            {
                state.state = CircuitBreakerState::Open;
                state.last_opened_at = Some(now);
                if self.config.enable_logging {
                    warn!(
                        "Circuit breaker '{}' opening after {} consecutive failures",
                        self.name, state.consecutive_failures
                    );
                }
            }
            _ => {}
        }
    }

    fn release_probe(&self) {
        let mut state = self.internal_state.lock();
        if state.state == CircuitBreakerState::HalfOpen {
            state.half_open_calls = state.half_open_calls.saturating_sub(1);
        }
    }

    /// Current state; Open only turns Half-Open when a call arrives
    pub fn state(&self) -> CircuitBreakerState {
        self.internal_state.lock().state
    }

    /// Snapshot of the call counters
    pub fn stats(&self) -> CircuitBreakerStats {
        let state = self.internal_state.lock();
        CircuitBreakerStats {
            state: state.state,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            consecutive_failures: state.consecutive_failures,
            last_failure_at: state.last_failure_at,
            last_opened_at: state.last_opened_at,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Force the circuit open (emergency stop)
    pub fn force_open(&self) {
        let now = self.clock.now();
        let mut state = self.internal_state.lock();
        state.state = CircuitBreakerState::Open;
        state.last_opened_at = Some(now);
        state.half_open_calls = 0;
        if self.config.enable_logging {
            warn!("Circuit breaker '{}' forcibly opened", self.name);
        }
    }

    /// Return to a fresh Closed state and zero the statistics
    pub fn reset(&self) {
        *self.internal_state.lock() = CircuitBreakerInternalState::closed();
        self.total_calls.store(0, Ordering::Relaxed);
        self.successful_calls.store(0, Ordering::Relaxed);
        self.failed_calls.store(0, Ordering::Relaxed);
        self.rejected_calls.store(0, Ordering::Relaxed);
        if self.config.enable_logging {
            info!("Circuit breaker '{}' reset", self.name);
        }
    }
}

/// Frees a half-open probe slot if the probe future is dropped mid-flight
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}

/// Fluent construction of a [`CircuitBreaker`]
pub struct CircuitBreakerBuilder {
    name: String,
    config: CircuitBreakerConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl CircuitBreakerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: CircuitBreakerConfig::default(),
            clock: None,
        }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.config.half_open_max_calls = max_calls;
        self
    }

    pub fn enable_logging(mut self, enable: bool) -> Self {
        self.config.enable_logging = enable;
        self
    }

    /// Decide which failures count toward opening
    pub fn error_predicate(mut self, predicate: fn(&AppError) -> bool) -> Self {
        self.config.is_circuit_breaking_error = predicate;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> CircuitBreaker {
        match self.clock {
            Some(clock) => CircuitBreaker::with_clock(self.name, self.config, clock),
            None => CircuitBreaker::new(self.name, self.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstractions::MockClock;
    use crate::error::{ErrorCode, ValidationCode};
    use std::sync::atomic::AtomicU32;

    fn failing() -> AppError {
        AppError::network(NetworkCode::ServerError, "failure")
    }

    fn breaker(clock: &MockClock, threshold: u32) -> CircuitBreaker {
        CircuitBreakerBuilder::new("test")
            .failure_threshold(threshold)
            .reset_timeout(Duration::from_secs(10))
            .enable_logging(false)
            .clock(Arc::new(clock.clone()))
            .build()
    }

    async fn trip(breaker: &CircuitBreaker, times: u32) {
        for _ in 0..times {
            let _ = breaker.execute(|| async { Err::<(), _>(failing()) }).await;
        }
    }

    #[tokio::test]
    async fn test_closed_state_passes_calls() {
        let clock = MockClock::new();
        let breaker = breaker(&clock, 3);

        for _ in 0..5 {
            let result = breaker.execute(|| async { Ok::<i32, AppError>(42) }).await;
            assert_eq!(result.unwrap(), 42);
        }

        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        let stats = breaker.stats();
        assert_eq!(stats.successful_calls, 5);
        assert_eq!(stats.failed_calls, 0);
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let clock = MockClock::new();
        let breaker = breaker(&clock, 3);

        for i in 0..3 {
            let _ = breaker.execute(|| async { Err::<(), _>(failing()) }).await;
            if i < 2 {
                assert_eq!(breaker.state(), CircuitBreakerState::Closed);
            }
        }

        assert_eq!(breaker.state(), CircuitBreakerState::Open);
        assert_eq!(breaker.stats().consecutive_failures, 3);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_count() {
        let clock = MockClock::new();
        let breaker = breaker(&clock, 3);

        trip(&breaker, 2).await;
        let _ = breaker.execute(|| async { Ok::<_, AppError>(()) }).await;
        trip(&breaker, 2).await;

        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert_eq!(breaker.stats().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_open_rejects_without_invoking() {
        let clock = MockClock::new();
        let breaker = breaker(&clock, 2);
        trip(&breaker, 2).await;

        let invoked = AtomicU32::new(0);
        let result = breaker
            .execute(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<i32, AppError>(42)
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Network(NetworkCode::CircuitOpen));
        assert!(err.is_retryable());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().rejected_calls, 1);
    }

    #[tokio::test]
    async fn test_half_open_after_reset_timeout_invokes_operation() {
        let clock = MockClock::new();
        let breaker = breaker(&clock, 2);
        trip(&breaker, 2).await;

        clock.advance(Duration::from_secs(9));
        assert!(breaker.execute(|| async { Ok::<_, AppError>(()) }).await.is_err());

        clock.advance(Duration::from_secs(1));
        let invoked = AtomicU32::new(0);
        let state_during_call = Mutex::new(None);
        let result = breaker
            .execute(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                *state_during_call.lock() = Some(breaker.state());
                Ok::<i32, AppError>(7)
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert_eq!(*state_during_call.lock(), Some(CircuitBreakerState::HalfOpen));
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let clock = MockClock::new();
        let breaker = breaker(&clock, 2);
        trip(&breaker, 2).await;

        clock.advance(Duration::from_secs(10));
        trip(&breaker, 1).await;

        assert_eq!(breaker.state(), CircuitBreakerState::Open);
        // counter keeps accumulating across the half-open probe
        assert_eq!(breaker.stats().consecutive_failures, 3);

        // and the reset timeout starts over
        clock.advance(Duration::from_secs(5));
        assert!(breaker.execute(|| async { Ok::<_, AppError>(()) }).await.is_err());
        assert_eq!(breaker.state(), CircuitBreakerState::Open);
    }

    #[tokio::test]
    async fn test_custom_predicate_ignores_validation_errors() {
        let clock = MockClock::new();
        let breaker = CircuitBreakerBuilder::new("test")
            .failure_threshold(2)
            .error_predicate(transient_failures_only)
            .enable_logging(false)
            .clock(Arc::new(clock.clone()))
            .build();

        for _ in 0..5 {
            let _ = breaker
                .execute(|| async {
                    Err::<(), _>(AppError::validation(ValidationCode::InvalidInput, "bad"))
                })
                .await;
        }

        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert_eq!(breaker.stats().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_reset_and_force_open() {
        let clock = MockClock::new();
        let breaker = breaker(&clock, 5);

        breaker.force_open();
        assert_eq!(breaker.state(), CircuitBreakerState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert_eq!(breaker.stats().total_calls, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let clock = MockClock::new();
        let breaker = breaker(&clock, 2);

        for _ in 0..3 {
            let _ = breaker.execute(|| async { Ok::<i32, AppError>(42) }).await;
        }
        trip(&breaker, 2).await;

        let stats = breaker.stats();
        assert_eq!(stats.total_calls, 5);
        assert_eq!(stats.successful_calls, 3);
        assert_eq!(stats.failed_calls, 2);
        assert_eq!(stats.state, CircuitBreakerState::Open);
        assert!(stats.last_failure_at.is_some());
    }
}
