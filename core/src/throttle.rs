//! Rate- and concurrency-limited access to the API.
//!
//! Every call first takes a rate token, then a concurrency slot, then runs
//! the request under its deadline. The slot is released when the call
//! settles; tokens are consumed, never returned.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::api::EcoMarketApi;
use crate::config::{ClientConfig, ConfigError};
use crate::error::ApiError;
use crate::limiter::ConcurrencyLimiter;
use crate::rate::RateLimiter;
use crate::timeout::with_timeout;
use crate::types::{NewProduct, Product, ProductFilter, ProductPatch};
use crate::url::ResourceId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrottleMetrics {
    pub total_requests: u64,
    pub successful: u64,
    pub failed: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    /// Mean time spent waiting for a token plus a slot.
    pub average_wait: Duration,
    pub max_concurrent: usize,
    pub max_per_second: f64,
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    waited_nanos: AtomicU64,
}

/// Books one call into [`Counters`]. A call dropped before it settles
/// counts as failed, and its time in the queue still counts as waiting.
struct Tally<'a> {
    counters: &'a Counters,
    queued: Instant,
    admitted: bool,
    settled: bool,
}

impl<'a> Tally<'a> {
    fn start(counters: &'a Counters) -> Self {
        counters.total.fetch_add(1, Ordering::Relaxed);
        Self {
            counters,
            queued: Instant::now(),
            admitted: false,
            settled: false,
        }
    }

    fn admitted(&mut self) -> Duration {
        let waited = self.queued.elapsed();
        self.counters
            .waited_nanos
            .fetch_add(waited.as_nanos() as u64, Ordering::Relaxed);
        self.admitted = true;
        waited
    }

    fn settle(mut self, ok: bool) {
        let counter = if ok {
            &self.counters.successful
        } else {
            &self.counters.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.settled = true;
    }
}

impl Drop for Tally<'_> {
    fn drop(&mut self) {
        if !self.admitted {
            self.admitted();
        }
        if !self.settled {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Result of [`ThrottledClient::create_many`].
#[derive(Debug, Clone)]
pub struct BulkOutcome {
    pub created: Vec<Product>,
    /// Input index and error for every product that was not created.
    pub failures: Vec<(usize, ApiError)>,
    pub elapsed: Duration,
    pub metrics: ThrottleMetrics,
}

impl BulkOutcome {
    /// Created products per second of wall time.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return self.created.len() as f64;
        }
        self.created.len() as f64 / secs
    }
}

/// Cloning shares the limiters and the counters.
#[derive(Debug, Clone)]
pub struct ThrottledClient {
    api: EcoMarketApi,
    rate: Arc<RateLimiter>,
    slots: ConcurrencyLimiter,
    counters: Arc<Counters>,
}

impl ThrottledClient {
    /// # Panics
    /// If `max_concurrent` is zero or `max_per_second` is not positive.
    pub fn new(api: EcoMarketApi, max_concurrent: usize, max_per_second: f64) -> Self {
        Self {
            api,
            rate: Arc::new(RateLimiter::new(max_per_second)),
            slots: ConcurrencyLimiter::new(max_concurrent),
            counters: Arc::default(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let api = EcoMarketApi::from_config(config)?;
        Ok(Self::new(api, config.max_concurrent, config.max_per_second))
    }

    pub fn api(&self) -> &EcoMarketApi {
        &self.api
    }

    /// Run `operation` under both limits. It receives the effective deadline
    /// (`timeout`, or the API default).
    pub async fn throttled_call<T, F, Fut>(
        &self,
        label: &str,
        timeout: Option<Duration>,
        operation: F,
    ) -> Result<T, ApiError>
    where
        F: FnOnce(Duration) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut tally = Tally::start(&self.counters);

        let admitted = async {
            self.rate.acquire().await;
            self.slots.acquire().await
        }
        .await;
        let waited = tally.admitted();

        let outcome = match admitted {
            Ok(_slot) => {
                debug!(operation = label, waited_ms = waited.as_millis() as u64, "admitted");
                let deadline = timeout.unwrap_or(self.api.default_timeout());
                with_timeout(label, deadline, operation(deadline)).await
            }
            Err(err) => Err(err),
        };
        tally.settle(outcome.is_ok());
        outcome
    }

    pub async fn list_products(
        &self,
        filter: &ProductFilter,
        timeout: Option<Duration>,
    ) -> Result<Vec<Product>, ApiError> {
        self.throttled_call("list_products", timeout, |d| self.api.list_products(filter, Some(d)))
            .await
    }

    pub async fn get_product(
        &self,
        id: impl Into<ResourceId>,
        timeout: Option<Duration>,
    ) -> Result<Product, ApiError> {
        let id = id.into();
        self.throttled_call("get_product", timeout, |d| self.api.get_product(id, Some(d)))
            .await
    }

    pub async fn create_product(
        &self,
        input: &NewProduct,
        timeout: Option<Duration>,
    ) -> Result<Product, ApiError> {
        self.throttled_call("create_product", timeout, |d| self.api.create_product(input, Some(d)))
            .await
    }

    pub async fn replace_product(
        &self,
        id: impl Into<ResourceId>,
        input: &NewProduct,
        timeout: Option<Duration>,
    ) -> Result<Product, ApiError> {
        let id = id.into();
        self.throttled_call("replace_product", timeout, |d| {
            self.api.replace_product(id, input, Some(d))
        })
        .await
    }

    pub async fn patch_product(
        &self,
        id: impl Into<ResourceId>,
        patch: &ProductPatch,
        timeout: Option<Duration>,
    ) -> Result<Product, ApiError> {
        let id = id.into();
        self.throttled_call("patch_product", timeout, |d| self.api.patch_product(id, patch, Some(d)))
            .await
    }

    pub async fn delete_product(
        &self,
        id: impl Into<ResourceId>,
        timeout: Option<Duration>,
    ) -> Result<(), ApiError> {
        let id = id.into();
        self.throttled_call("delete_product", timeout, |d| self.api.delete_product(id, Some(d)))
            .await
    }

    /// Create every product concurrently under the limits. Failures are
    /// collected with their input index; nothing is retried.
    pub async fn create_many(&self, products: &[NewProduct]) -> BulkOutcome {
        let started = Instant::now();
        info!(count = products.len(), "bulk create started");

        let outcomes = join_all(products.iter().map(|p| self.create_product(p, None))).await;

        let mut created = Vec::new();
        let mut failures = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(product) => created.push(product),
                Err(err) => failures.push((index, err)),
            }
        }
        let elapsed = started.elapsed();
        info!(
            created = created.len(),
            failed = failures.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "bulk create finished"
        );
        BulkOutcome {
            created,
            failures,
            elapsed,
            metrics: self.metrics(),
        }
    }

    pub fn metrics(&self) -> ThrottleMetrics {
        let total = self.counters.total.load(Ordering::Relaxed);
        let waited = self.counters.waited_nanos.load(Ordering::Relaxed);
        ThrottleMetrics {
            total_requests: total,
            successful: self.counters.successful.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            in_flight: self.slots.in_flight(),
            peak_in_flight: self.slots.peak(),
            average_wait: if total == 0 {
                Duration::ZERO
            } else {
                Duration::from_nanos(waited / total)
            },
            max_concurrent: self.slots.max_concurrent(),
            max_per_second: self.rate.max_per_second(),
        }
    }

    /// Stop admitting work. Calls waiting for a slot, and every later call,
    /// fail with `Cancelled`; calls already running finish normally.
    pub fn close(&self) {
        info!("throttled client closed");
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }
}
