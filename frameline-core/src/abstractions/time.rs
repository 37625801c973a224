//! Time abstractions for testability
//!
//! The rate limiter, circuit breaker, stores and repositories read time through
//! [`Clock`] so tests can drive it deterministically with [`MockClock`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;

/// Point on a monotonic timeline, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(u64); // Microseconds since the clock's origin

impl Instant {
    /// Instant `micros` after the clock's origin
    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Microseconds since the clock's origin
    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// Duration since another instant, zero if `earlier` is later
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    /// Instant `duration` after this one
    pub fn saturating_add(&self, duration: Duration) -> Instant {
        Instant(self.0.saturating_add(duration.as_micros() as u64))
    }
}

/// Source of time for limiters, breakers and stores
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic now
    fn now(&self) -> Instant;

    /// Get current wall-clock time
    fn system_time(&self) -> SystemTime;

    /// Sleep for a duration
    async fn sleep(&self, duration: Duration);

    /// Wall-clock time as a UTC timestamp
    fn utc_now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.system_time())
    }
}

/// Production clock backed by `std::time` and tokio timers
pub struct SystemClock {
    origin: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }

    /// Shared handle, the form most constructors take
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.origin.elapsed().as_micros() as u64)
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually driven clock; time moves only through `advance` and `set_time`
///
/// Time only moves when [`MockClock::advance`] or [`MockClock::set_time`] is
/// called. Clones share the same timeline.
#[derive(Clone)]
pub struct MockClock {
    current_micros: Arc<AtomicU64>,
    time_advanced: Arc<Notify>,
}

impl MockClock {
    /// Mock clock at the origin
    pub fn new() -> Self {
        Self::with_time(0)
    }

    /// Mock clock starting `micros` after the origin
    pub fn with_time(micros: u64) -> Self {
        Self {
            current_micros: Arc::new(AtomicU64::new(micros)),
            time_advanced: Arc::new(Notify::new()),
        }
    }

    /// Move the clock forward and wake sleepers
    pub fn advance(&self, duration: Duration) {
        self.current_micros
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
        self.time_advanced.notify_waiters();
    }

    /// Set absolute time
    pub fn set_time(&self, micros: u64) {
        self.current_micros.store(micros, Ordering::SeqCst);
        self.time_advanced.notify_waiters();
    }

    /// Get current mock time in microseconds
    pub fn current_time(&self) -> u64 {
        self.current_micros.load(Ordering::SeqCst)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.current_time())
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_micros(self.current_time())
    }

    async fn sleep(&self, duration: Duration) {
        let target_micros = self.current_time() + duration.as_micros() as u64;

        loop {
            let notified = self.time_advanced.notified();
            tokio::pin!(notified);
            // Register before re-checking so an advance in between is not missed
            notified.as_mut().enable();

            if self.current_time() >= target_micros {
                break;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_arithmetic() {
        let start = Instant::from_micros(1_000);
        let later = start.saturating_add(Duration::from_millis(5));
        assert_eq!(later.as_micros(), 6_000);
        assert_eq!(later.duration_since(start), Duration::from_millis(5));
        assert_eq!(start.duration_since(later), Duration::ZERO);
    }

    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::new();
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now().as_micros(), 2_000_000);

        clock.set_time(10);
        assert_eq!(clock.now(), Instant::from_micros(10));
    }

    #[tokio::test]
    async fn test_mock_clock_sleep() {
        let clock = MockClock::new();

        let clock_clone = clock.clone();
        let sleep_handle = tokio::spawn(async move {
            clock_clone.sleep(Duration::from_secs(5)).await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!sleep_handle.is_finished());

        clock.advance(Duration::from_secs(5));

        sleep_handle.await.unwrap();
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
