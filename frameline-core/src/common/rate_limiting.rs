//! Sliding-window rate limiting for sensitive operations
//!
//! Each key keeps the timestamps of its recent attempts and an optional
//! "blocked until" instant. While a block is active every attempt is rejected
//! regardless of the window; once it expires the window is evaluated again.
//!
//! Limiters are plain values owned by whoever needs them; there is no global
//! instance. A multi-process deployment would need the bucket map moved to a
//! shared cache to stay correct.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::abstractions::{Clock, Instant, SystemClock};
use crate::config::{RateLimitSettings, RateLimitsConfig};
use crate::error::{AppError, AppResult, AuthCode};

/// Limits for one rate limiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Attempts allowed inside one window
    pub max_attempts: u32,
    /// Length of the sliding window
    pub window: Duration,
    /// Cooldown applied once the window is exhausted; `None` means pure
    /// sliding-window limiting
    pub block_duration: Option<Duration>,
}

impl RateLimitConfig {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            block_duration: None,
        }
    }

    pub fn with_block_duration(mut self, block_duration: Duration) -> Self {
        self.block_duration = Some(block_duration);
        self
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            window: settings.window,
            block_duration: settings.block_duration,
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    attempts: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

impl Bucket {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.attempts.front() {
            if now.duration_since(*oldest) >= window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
    }

    fn attempts_in_window(&self, now: Instant, window: Duration) -> usize {
        self.attempts
            .iter()
            .filter(|at| now.duration_since(**at) < window)
            .count()
    }

    fn block_remaining(&self, now: Instant) -> Option<Duration> {
        match self.blocked_until {
            Some(until) if now < until => Some(until.duration_since(now)),
            _ => None,
        }
    }
}

/// Per-key sliding-window attempt counter
pub struct RateLimiter {
    name: String,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimitConfig) -> Self {
        Self::with_clock(name, config, SystemClock::shared())
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            buckets: DashMap::new(),
        }
    }

    /// Check and record an attempt for `key`.
    ///
    /// Returns false without recording anything while `key` is blocked or its
    /// window is full. Filling the window starts a block when one is
    /// configured.
    pub fn can_attempt(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut bucket = self.buckets.entry(key.to_string()).or_default();

        if bucket.block_remaining(now).is_some() {
            debug!("Rate limiter '{}': key {} is blocked", self.name, key);
            return false;
        }
        bucket.blocked_until = None;

        bucket.prune(now, self.config.window);

        if bucket.attempts.len() >= self.config.max_attempts as usize {
            if let Some(block) = self.config.block_duration {
                bucket.blocked_until = Some(now.saturating_add(block));
                warn!(
                    "Rate limiter '{}': blocking key {} for {:?} after {} attempts",
                    self.name,
                    key,
                    block,
                    bucket.attempts.len()
                );
            } else {
                debug!("Rate limiter '{}': window full for key {}", self.name, key);
            }
            return false;
        }

        bucket.attempts.push_back(now);
        true
    }

    /// Like [`RateLimiter::can_attempt`], failing with `AUTH_TOO_MANY_REQUESTS`
    pub fn check(&self, key: &str) -> AppResult<()> {
        if self.can_attempt(key) {
            return Ok(());
        }

        let wait = self.time_until_next_attempt(key);
        Err(AppError::auth(
            AuthCode::TooManyRequests,
            format!("Rate limit '{}' exceeded for {}", self.name, key),
        )
        .with_context("limiter", self.name.as_str())
        .with_context("retry_after_ms", wait.as_millis().to_string()))
    }

    /// Attempts left in the current window; zero while blocked
    pub fn remaining_attempts(&self, key: &str) -> u32 {
        let now = self.clock.now();
        let Some(bucket) = self.buckets.get(key) else {
            return self.config.max_attempts;
        };

        if bucket.block_remaining(now).is_some() {
            return 0;
        }

        let used = bucket.attempts_in_window(now, self.config.window) as u32;
        self.config.max_attempts.saturating_sub(used)
    }

    /// Time left on an active block; always zero without a block duration
    pub fn time_until_unblocked(&self, key: &str) -> Duration {
        let now = self.clock.now();
        self.buckets
            .get(key)
            .and_then(|bucket| bucket.block_remaining(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Forget history and block for one key, e.g. after a successful sign-in
    pub fn reset(&self, key: &str) {
        self.buckets.remove(key);
    }

    /// Forget every key
    pub fn clear(&self) {
        self.buckets.clear();
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn time_until_next_attempt(&self, key: &str) -> Duration {
        let blocked = self.time_until_unblocked(key);
        if !blocked.is_zero() {
            return blocked;
        }

        let now = self.clock.now();
        self.buckets
            .get(key)
            .and_then(|bucket| {
                bucket
                    .attempts
                    .iter()
                    .find(|at| now.duration_since(**at) < self.config.window)
                    .map(|oldest| self.config.window.saturating_sub(now.duration_since(*oldest)))
            })
            .unwrap_or(Duration::ZERO)
    }
}

/// The limiters guarding authentication flows
pub struct RateLimiterRegistry {
    pub sign_in: RateLimiter,
    pub sign_up: RateLimiter,
    pub password_reset: RateLimiter,
}

impl RateLimiterRegistry {
    pub fn from_config(config: &RateLimitsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sign_in: RateLimiter::with_clock("sign_in", (&config.sign_in).into(), clock.clone()),
            sign_up: RateLimiter::with_clock("sign_up", (&config.sign_up).into(), clock.clone()),
            password_reset: RateLimiter::with_clock(
                "password_reset",
                (&config.password_reset).into(),
                clock,
            ),
        }
    }

    /// Reset every limiter, for test isolation
    pub fn clear_all(&self) {
        self.sign_in.clear();
        self.sign_up.clear();
        self.password_reset.clear();
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::from_config(&RateLimitsConfig::default(), SystemClock::shared())
    }
}
