//! Client core for the EcoMarket product API.
//!
//! # Overview
//! Two layers share one error type:
//!
//! - A synchronous, I/O-free layer. `EcoMarketClient` builds `HttpRequest`
//!   values and parses `HttpResponse` values, validating bodies and
//!   sanitizing URLs along the way. Any host can execute the round-trip.
//! - An async layer on top. `EcoMarketApi` runs those requests through a
//!   `Transport` under per-call deadlines. `Coordinator` loads several of them
//!   concurrently with wait-all, cancel-on-401 and priority policies.
//!   `ThrottledClient` bounds request rate and concurrency.
//!
//! # Design
//! - `EcoMarketClient` is stateless: a base URL and an optional token.
//! - The token bucket and the slot pool are owned by a `ThrottledClient`
//!   instance, never global.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.
//! - The library never installs a tracing subscriber.

pub mod api;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod limiter;
pub mod rate;
pub mod throttle;
pub mod timeout;
pub mod transport;
pub mod types;
pub mod url;
pub mod validate;

pub use api::EcoMarketApi;
pub use client::EcoMarketClient;
pub use config::{ClientConfig, ConfigError};
pub use coordinator::{
    Coordinator, DashboardLoad, DashboardResult, Descriptor, LoadMode, PartialDashboard, Priority,
    TaskFailure, TaskStatus,
};
pub use dashboard::{standard_descriptors, DashboardTimeouts, Panel};
pub use error::{ApiError, ErrorKind};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use limiter::{ConcurrencyLimiter, ConcurrencyPermit};
pub use rate::{RateLimiter, TokenBucket};
pub use throttle::{BulkOutcome, ThrottleMetrics, ThrottledClient};
pub use timeout::with_timeout;
pub use transport::{ReqwestTransport, Transport};
pub use types::{NewProduct, Notification, Product, ProductFilter, ProductPatch, Producer, Profile};
pub use url::{ResourceId, UrlBuilder, UrlError};
pub use validate::SchemaError;
