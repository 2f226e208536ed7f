//! Async request functions: build, execute, parse, under a deadline.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::client::EcoMarketClient;
use crate::config::{ClientConfig, ConfigError};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::timeout::with_timeout;
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{NewProduct, Notification, Product, ProductFilter, ProductPatch, Profile};
use crate::url::ResourceId;

type Parser<T> = fn(&EcoMarketClient, HttpResponse) -> Result<T, ApiError>;

/// One async method per EcoMarket operation.
///
/// Every method takes an optional per-call timeout; `None` falls back to the
/// instance default. The deadline is enforced by [`with_timeout`] around the
/// whole round-trip and is also handed to the transport.
#[derive(Clone)]
pub struct EcoMarketApi {
    client: EcoMarketClient,
    transport: Arc<dyn Transport>,
    default_timeout: Duration,
}

impl EcoMarketApi {
    pub fn new(client: EcoMarketClient, transport: Arc<dyn Transport>) -> Self {
        Self {
            client,
            transport,
            default_timeout: ClientConfig::default().default_timeout(),
        }
    }

    /// Validate `config` and wire a `ReqwestTransport`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut client = EcoMarketClient::new(&config.base_url)?;
        if let Some(token) = &config.auth_token {
            client = client.with_token(token.clone());
        }
        Ok(Self::new(client, Arc::new(ReqwestTransport::new()))
            .with_default_timeout(config.default_timeout()))
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn client(&self) -> &EcoMarketClient {
        &self.client
    }

    pub async fn list_products(
        &self,
        filter: &ProductFilter,
        timeout: Option<Duration>,
    ) -> Result<Vec<Product>, ApiError> {
        let request = self.client.build_list_products(filter);
        self.send("list_products", request, timeout, EcoMarketClient::parse_list_products)
            .await
    }

    pub async fn get_product(
        &self,
        id: impl Into<ResourceId>,
        timeout: Option<Duration>,
    ) -> Result<Product, ApiError> {
        let request = self.client.build_get_product(id);
        self.send("get_product", request, timeout, EcoMarketClient::parse_get_product)
            .await
    }

    pub async fn create_product(
        &self,
        input: &NewProduct,
        timeout: Option<Duration>,
    ) -> Result<Product, ApiError> {
        let request = self.client.build_create_product(input);
        self.send("create_product", request, timeout, EcoMarketClient::parse_create_product)
            .await
    }

    pub async fn replace_product(
        &self,
        id: impl Into<ResourceId>,
        input: &NewProduct,
        timeout: Option<Duration>,
    ) -> Result<Product, ApiError> {
        let request = self.client.build_replace_product(id, input);
        self.send("replace_product", request, timeout, EcoMarketClient::parse_replace_product)
            .await
    }

    pub async fn patch_product(
        &self,
        id: impl Into<ResourceId>,
        patch: &ProductPatch,
        timeout: Option<Duration>,
    ) -> Result<Product, ApiError> {
        let request = self.client.build_patch_product(id, patch);
        self.send("patch_product", request, timeout, EcoMarketClient::parse_patch_product)
            .await
    }

    pub async fn delete_product(
        &self,
        id: impl Into<ResourceId>,
        timeout: Option<Duration>,
    ) -> Result<(), ApiError> {
        let request = self.client.build_delete_product(id);
        self.send("delete_product", request, timeout, EcoMarketClient::parse_delete_product)
            .await
    }

    pub async fn list_categories(&self, timeout: Option<Duration>) -> Result<Vec<String>, ApiError> {
        let request = self.client.build_list_categories();
        self.send("list_categories", request, timeout, EcoMarketClient::parse_list_categories)
            .await
    }

    pub async fn get_profile(&self, timeout: Option<Duration>) -> Result<Profile, ApiError> {
        let request = self.client.build_get_profile();
        self.send("get_profile", request, timeout, EcoMarketClient::parse_get_profile)
            .await
    }

    pub async fn list_notifications(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Vec<Notification>, ApiError> {
        let request = self.client.build_list_notifications();
        self.send(
            "list_notifications",
            request,
            timeout,
            EcoMarketClient::parse_list_notifications,
        )
        .await
    }

    async fn send<T>(
        &self,
        label: &str,
        request: Result<HttpRequest, ApiError>,
        timeout: Option<Duration>,
        parse: Parser<T>,
    ) -> Result<T, ApiError> {
        let request = request?;
        let deadline = timeout.unwrap_or(self.default_timeout);
        debug!(operation = label, method = %request.method, url = %request.path, "sending");

        let response = with_timeout(label, deadline, self.transport.execute(request, deadline)).await?;
        debug!(operation = label, status = response.status, "received");
        parse(&self.client, response)
    }
}

impl std::fmt::Debug for EcoMarketApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcoMarketApi")
            .field("base_url", &self.client.base_url())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
