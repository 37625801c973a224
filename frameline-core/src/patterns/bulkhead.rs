//! Concurrency bulkhead
//!
//! Caps how many invocations of one operation run at the same time. Extra
//! callers wait in FIFO order on a fair semaphore and each receives its own
//! operation's result once it gets a permit.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{AppError, AppResult};

pub struct Bulkhead {
    name: String,
    max_concurrency: usize,
    semaphore: Semaphore,
    active: AtomicUsize,
    queued: AtomicUsize,
}

impl Bulkhead {
    /// `max_concurrency` of zero is treated as one
    pub fn new(name: impl Into<String>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            name: name.into(),
            max_concurrency,
            semaphore: Semaphore::new(max_concurrency),
            active: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
        }
    }

    /// Run `operation` once a slot is free
    pub async fn execute<F, Fut, T>(&self, operation: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let permit = {
            let _waiting = CountGuard::enter(&self.queued);
            if self.semaphore.available_permits() == 0 {
                debug!("Bulkhead '{}' full, queueing call", self.name);
            }
            self.semaphore.acquire().await.map_err(|_| {
                AppError::unknown(format!("Bulkhead '{}' has been closed", self.name))
            })?
        };

        let _running = CountGuard::enter(&self.active);
        let result = operation().await;
        drop(permit);
        result
    }

    /// Invocations currently running
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Invocations waiting for a slot
    pub fn queued_count(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Increments a counter for its lifetime, including when the future is dropped
struct CountGuard<'a>(&'a AtomicUsize);

impl<'a> CountGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
