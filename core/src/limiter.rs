//! Bounds the number of simultaneously in-flight requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::trace;

use crate::error::ApiError;

/// Counting slot pool over a `tokio::sync::Semaphore`.
///
/// Cloning shares the pool. Held permits never exceed `max_concurrent`.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    semaphore: Arc<Semaphore>,
    max: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// A held slot. Dropping it (including during unwinding or cancellation)
/// returns the slot to the pool.
#[derive(Debug)]
pub struct ConcurrencyPermit {
    inner: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// # Panics
    /// If `max_concurrent` is zero.
    pub fn new(max_concurrent: usize) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be greater than zero");
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(max_concurrent)),
                max: max_concurrent,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a free slot. Fails with `Cancelled` once the pool is closed.
    pub async fn acquire(&self) -> Result<ConcurrencyPermit, ApiError> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ApiError::Cancelled)?;
        Ok(self.admit(permit))
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<ConcurrencyPermit> {
        match Arc::clone(&self.inner.semaphore).try_acquire_owned() {
            Ok(permit) => Some(self.admit(permit)),
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => None,
        }
    }

    /// Wake every waiter with `Cancelled` and refuse further acquisitions.
    /// Permits already held stay valid until dropped.
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.semaphore.is_closed()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Highest `in_flight` observed since construction.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> ConcurrencyPermit {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        trace!(in_flight = now, max = self.inner.max, "slot acquired");
        ConcurrencyPermit {
            inner: Arc::clone(&self.inner),
            _permit: permit,
        }
    }
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        // Runs before `_permit` is dropped, so the counter never lags a
        // waiter that is about to be admitted.
        let now = self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        trace!(in_flight = now, "slot released");
    }
}
