//! Token-bucket rate limiting.
//!
//! Tokens accrue continuously at `refill_rate` per second up to `capacity`.
//! `acquire` never rejects: it sleeps until a token is available. Time is
//! read from `tokio::time::Instant`, so paused-clock tests are exact.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Slack for float rounding when comparing against one whole token.
const EPSILON: f64 = 1e-9;

#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    ///
    /// # Panics
    /// If `capacity` or `refill_rate` is not a positive finite number.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self::with_tokens(capacity, refill_rate, capacity)
    }

    /// An empty bucket; the first token arrives after `1 / refill_rate`.
    pub fn empty(capacity: f64, refill_rate: f64) -> Self {
        Self::with_tokens(capacity, refill_rate, 0.0)
    }

    fn with_tokens(capacity: f64, refill_rate: f64, tokens: f64) -> Self {
        assert!(capacity.is_finite() && capacity > 0.0, "capacity must be positive");
        assert!(refill_rate.is_finite() && refill_rate > 0.0, "refill_rate must be positive");
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Take one token now, or report how long until one is available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.lock();
        self.refill(&mut state);
        if state.tokens + EPSILON >= 1.0 {
            state.tokens = (state.tokens - 1.0).max(0.0);
            Ok(())
        } else {
            let missing = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    /// Take one token, sleeping as needed. Returns the time spent waiting.
    ///
    /// The lock is never held across the sleep; waiters that lose the race
    /// for a refilled token recompute their wait and sleep again.
    pub async fn acquire(&self) -> Duration {
        let start = Instant::now();
        loop {
            match self.try_acquire() {
                Ok(()) => return start.elapsed(),
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Tokens currently in the bucket, after refill.
    pub fn available(&self) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admits at most `max_per_second` requests per second on average, with
/// bursts up to `floor(max_per_second)` (at least one).
#[derive(Debug)]
pub struct RateLimiter {
    bucket: TokenBucket,
    max_per_second: f64,
    grants: AtomicU64,
    waited_nanos: AtomicU64,
}

impl RateLimiter {
    /// # Panics
    /// If `max_per_second` is not a positive finite number.
    pub fn new(max_per_second: f64) -> Self {
        let capacity = max_per_second.floor().max(1.0);
        Self {
            bucket: TokenBucket::new(capacity, max_per_second),
            max_per_second,
            grants: AtomicU64::new(0),
            waited_nanos: AtomicU64::new(0),
        }
    }

    pub async fn acquire(&self) -> Duration {
        let waited = self.bucket.acquire().await;
        if waited > Duration::from_millis(1) {
            debug!(waited_ms = waited.as_millis() as u64, "rate limit wait");
        }
        self.grants.fetch_add(1, Ordering::Relaxed);
        self.waited_nanos
            .fetch_add(waited.as_nanos() as u64, Ordering::Relaxed);
        waited
    }

    pub fn max_per_second(&self) -> f64 {
        self.max_per_second
    }

    pub fn grants(&self) -> u64 {
        self.grants.load(Ordering::Relaxed)
    }

    /// Mean time spent waiting for a token across all grants.
    pub fn average_wait(&self) -> Duration {
        let grants = self.grants();
        if grants == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.waited_nanos.load(Ordering::Relaxed) / grants)
    }

    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::task::JoinSet;

    fn ms(d: Duration) -> u64 {
        d.as_millis() as u64
    }

    #[tokio::test(start_paused = true)]
    async fn burst_then_steady_spacing() {
        let bucket = Arc::new(TokenBucket::new(5.0, 5.0));
        let start = Instant::now();
        let mut set = JoinSet::new();
        for _ in 0..20 {
            let bucket = Arc::clone(&bucket);
            set.spawn(async move {
                bucket.acquire().await;
                start.elapsed()
            });
        }
        let mut granted = Vec::new();
        while let Some(res) = set.join_next().await {
            granted.push(res.unwrap());
        }
        granted.sort();

        for at in &granted[..5] {
            assert_eq!(ms(*at), 0);
        }
        for (i, at) in granted[5..].iter().enumerate() {
            let expected = 200 * (i as u64 + 1);
            let got = ms(*at);
            assert!(got >= expected && got <= expected + 20, "grant {i}: {got} ms, expected ~{expected}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_bucket_waits_one_interval() {
        let bucket = TokenBucket::empty(1.0, 4.0);
        let waited = bucket.acquire().await;
        assert!(ms(waited) >= 250 && ms(waited) <= 251, "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_continuous_and_capped() {
        let bucket = TokenBucket::empty(3.0, 10.0);
        tokio::time::sleep(Duration::from_millis(150)).await;
        let tokens = bucket.available();
        assert!((tokens - 1.5).abs() < 1e-6, "{tokens}");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(bucket.available(), 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_reports_wait() {
        let bucket = TokenBucket::new(1.0, 2.0);
        assert!(bucket.try_acquire().is_ok());
        let wait = bucket.try_acquire().unwrap_err();
        assert_eq!(ms(wait), 500);
        assert!(bucket.available() >= 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn steady_state_window_is_bounded() {
        let limiter = Arc::new(RateLimiter::new(10.0));
        let start = Instant::now();
        let mut stamps = Vec::new();
        for _ in 0..60 {
            limiter.acquire().await;
            stamps.push(start.elapsed());
        }
        // After the initial burst, any one-second window admits at most the
        // refill rate plus one boundary grant.
        let steady: Vec<_> = stamps.iter().filter(|t| **t >= Duration::from_secs(1)).collect();
        for (i, first) in steady.iter().enumerate() {
            let in_window = steady[i..]
                .iter()
                .take_while(|t| ***t < **first + Duration::from_secs(1))
                .count();
            assert!(in_window <= 11, "{in_window} grants within 1s of {first:?}");
        }
        assert_eq!(limiter.grants(), 60);
        assert!(limiter.average_wait() > Duration::ZERO);
    }

    #[test]
    fn capacity_is_at_least_one() {
        let limiter = RateLimiter::new(0.5);
        assert_eq!(limiter.bucket().capacity(), 1.0);
        assert_eq!(limiter.bucket().refill_rate(), 0.5);
        assert_eq!(limiter.average_wait(), Duration::ZERO);
    }
}
