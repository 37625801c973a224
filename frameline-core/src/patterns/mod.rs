//! Failure-recovery primitives
//!
//! Every remote call in Frameline can be wrapped by these. None of them
//! changes an error's retryability; they only decide whether to try again,
//! give up, or substitute a value.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod fallback;
pub mod recovery;
pub mod retry;
pub mod timeout;

pub use bulkhead::Bulkhead;
pub use circuit_breaker::{
    transient_failures_only, CircuitBreaker, CircuitBreakerBuilder, CircuitBreakerConfig,
    CircuitBreakerState, CircuitBreakerStats,
};
pub use fallback::with_fallback;
pub use recovery::{with_recovery_strategies, RecoveryOptions, RecoveryPolicy};
pub use retry::{with_retry, with_retry_notify, BackoffStrategy, JitterStrategy, RetryConfig};
pub use timeout::{with_cancellable_timeout, with_timeout};
