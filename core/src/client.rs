//! Stateless HTTP request builder and response parser for the EcoMarket API.
//!
//! # Design
//! `EcoMarketClient` holds only a `UrlBuilder` and an optional bearer token
//! and carries no mutable state between calls. Each operation is split into a
//! `build_*` method that produces an `HttpRequest` and a `parse_*` method that
//! consumes an `HttpResponse`. Whoever sits in between (a `Transport`, or a
//! synchronous host) performs the round-trip, keeping this layer
//! deterministic and free of I/O.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{NewProduct, Notification, Product, ProductFilter, ProductPatch, Profile};
use crate::url::{ResourceId, UrlBuilder, UrlError};
use crate::validate::{validate_product, validate_product_list};

const PRODUCTS: &str = "productos";
const CATEGORIES: &str = "categorias";
const PROFILE: &str = "perfil";
const NOTIFICATIONS: &str = "notificaciones";

/// Synchronous, stateless client for the EcoMarket API.
#[derive(Debug, Clone)]
pub struct EcoMarketClient {
    urls: UrlBuilder,
    token: Option<String>,
}

impl EcoMarketClient {
    pub fn new(base_url: &str) -> Result<Self, UrlError> {
        Ok(Self {
            urls: UrlBuilder::new(base_url)?,
            token: None,
        })
    }

    /// Attach `Authorization: Bearer <token>` to every built request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        self.urls.base().as_str()
    }

    pub fn build_list_products(&self, filter: &ProductFilter) -> Result<HttpRequest, ApiError> {
        self.request(HttpMethod::Get, &[PRODUCTS], &filter.query_pairs(), None)
    }

    pub fn build_get_product(&self, id: impl Into<ResourceId>) -> Result<HttpRequest, ApiError> {
        let id = id.into().to_string();
        self.request(HttpMethod::Get, &[PRODUCTS, &id], &[], None)
    }

    pub fn build_create_product(&self, input: &NewProduct) -> Result<HttpRequest, ApiError> {
        let body = to_json(input)?;
        self.request(HttpMethod::Post, &[PRODUCTS], &[], Some(body))
    }

    pub fn build_replace_product(
        &self,
        id: impl Into<ResourceId>,
        input: &NewProduct,
    ) -> Result<HttpRequest, ApiError> {
        let id = id.into().to_string();
        let body = to_json(input)?;
        self.request(HttpMethod::Put, &[PRODUCTS, &id], &[], Some(body))
    }

    pub fn build_patch_product(
        &self,
        id: impl Into<ResourceId>,
        patch: &ProductPatch,
    ) -> Result<HttpRequest, ApiError> {
        let id = id.into().to_string();
        let body = to_json(patch)?;
        self.request(HttpMethod::Patch, &[PRODUCTS, &id], &[], Some(body))
    }

    pub fn build_delete_product(&self, id: impl Into<ResourceId>) -> Result<HttpRequest, ApiError> {
        let id = id.into().to_string();
        self.request(HttpMethod::Delete, &[PRODUCTS, &id], &[], None)
    }

    pub fn build_list_categories(&self) -> Result<HttpRequest, ApiError> {
        self.request(HttpMethod::Get, &[CATEGORIES], &[], None)
    }

    pub fn build_get_profile(&self) -> Result<HttpRequest, ApiError> {
        self.request(HttpMethod::Get, &[PROFILE], &[], None)
    }

    pub fn build_list_notifications(&self) -> Result<HttpRequest, ApiError> {
        self.request(HttpMethod::Get, &[NOTIFICATIONS], &[], None)
    }

    pub fn parse_list_products(&self, response: HttpResponse) -> Result<Vec<Product>, ApiError> {
        check_status(&response, 200)?;
        let value = json_body(&response)?;
        validate_product_list(&value).map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
        from_value(value)
    }

    pub fn parse_get_product(&self, response: HttpResponse) -> Result<Product, ApiError> {
        check_status(&response, 200)?;
        parse_product(&response)
    }

    pub fn parse_create_product(&self, response: HttpResponse) -> Result<Product, ApiError> {
        check_status(&response, 201)?;
        parse_product(&response)
    }

    pub fn parse_replace_product(&self, response: HttpResponse) -> Result<Product, ApiError> {
        check_status(&response, 200)?;
        parse_product(&response)
    }

    pub fn parse_patch_product(&self, response: HttpResponse) -> Result<Product, ApiError> {
        check_status(&response, 200)?;
        parse_product(&response)
    }

    pub fn parse_delete_product(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, 204)?;
        Ok(())
    }

    pub fn parse_list_categories(&self, response: HttpResponse) -> Result<Vec<String>, ApiError> {
        check_status(&response, 200)?;
        from_value(json_body(&response)?)
    }

    pub fn parse_get_profile(&self, response: HttpResponse) -> Result<Profile, ApiError> {
        check_status(&response, 200)?;
        from_value(json_body(&response)?)
    }

    pub fn parse_list_notifications(
        &self,
        response: HttpResponse,
    ) -> Result<Vec<Notification>, ApiError> {
        check_status(&response, 200)?;
        from_value(json_body(&response)?)
    }

    fn request(
        &self,
        method: HttpMethod,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<HttpRequest, ApiError> {
        let url = self.urls.build(segments, query)?;
        let mut headers = vec![("accept".to_string(), "application/json".to_string())];
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        if let Some(token) = &self.token {
            headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }
        Ok(HttpRequest {
            method,
            path: url.into(),
            headers,
            body,
        })
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    Err(match response.status {
        401 => ApiError::Unauthorized,
        403 => ApiError::Forbidden,
        404 => ApiError::NotFound,
        status @ 500..=599 => ApiError::ServerError {
            status,
            body: response.body.clone(),
        },
        status => ApiError::HttpError {
            status,
            body: response.body.clone(),
        },
    })
}

fn json_body(response: &HttpResponse) -> Result<Value, ApiError> {
    if !response.is_json() {
        let content_type = response.header("content-type").unwrap_or("<none>");
        return Err(ApiError::MalformedResponse(format!(
            "expected application/json, got {content_type}"
        )));
    }
    serde_json::from_str(&response.body).map_err(|e| ApiError::MalformedResponse(e.to_string()))
}

fn parse_product(response: &HttpResponse) -> Result<Product, ApiError> {
    let value = json_body(response)?;
    validate_product(&value, "").map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
    from_value(value)
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::MalformedResponse(e.to_string()))
}

fn to_json<T: Serialize>(input: &T) -> Result<String, ApiError> {
    serde_json::to_string(input).map_err(|e| ApiError::Serialization(e.to_string()))
}
