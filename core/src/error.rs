//! Error types for the EcoMarket client.
//!
//! # Design
//! One error enum, `ApiError`, flows through every layer: request functions,
//! the timeout wrapper, the dashboard coordinator and the throttled client.
//! Status codes the dashboard reacts to (401, 403, 404, 5xx) get dedicated
//! variants; any other unexpected status lands in `HttpError` with the raw
//! status and body for debugging.
//!
//! `ErrorKind` is the `Copy` projection stored in dashboard error records.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::url::UrlError;

/// Errors returned by request functions and the coordination layer.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The operation did not settle before its deadline.
    #[error("operation '{label}' exceeded its timeout of {:.3}s", after.as_secs_f64())]
    Timeout { label: String, after: Duration },

    /// The server returned 401.
    #[error("unauthorized: missing or invalid credentials")]
    Unauthorized,

    /// The server returned 403.
    #[error("forbidden")]
    Forbidden,

    /// The server returned 404.
    #[error("resource not found")]
    NotFound,

    /// The server returned a 5xx status.
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },

    /// The server returned an unexpected non-5xx status (400, 409, 422, ...).
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The body was not JSON, did not deserialize, or failed schema validation.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Connection-level failure before a status line was received.
    #[error("network error: {0}")]
    Network(String),

    /// The task was cancelled before it settled.
    #[error("cancelled")]
    Cancelled,

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Two dashboard descriptors share a name.
    #[error("duplicate descriptor name '{0}'")]
    DuplicateDescriptor(String),

    /// The request URL was rejected by the sanitizer.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] UrlError),
}

impl ApiError {
    pub fn timeout(label: impl Into<String>, after: Duration) -> Self {
        ApiError::Timeout {
            label: label.into(),
            after,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Timeout { .. } => ErrorKind::Timeout,
            ApiError::Unauthorized => ErrorKind::Unauthorized,
            ApiError::Forbidden => ErrorKind::Forbidden,
            ApiError::NotFound => ErrorKind::NotFound,
            ApiError::ServerError { .. } => ErrorKind::ServerError,
            ApiError::HttpError { .. } => ErrorKind::Rejected,
            ApiError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Cancelled => ErrorKind::Cancelled,
            ApiError::Serialization(_) | ApiError::DuplicateDescriptor(_) | ApiError::InvalidUrl(_) => {
                ErrorKind::InvalidRequest
            }
        }
    }
}

/// Error classification recorded per dashboard task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Unauthorized,
    Forbidden,
    NotFound,
    ServerError,
    Rejected,
    MalformedResponse,
    Network,
    Cancelled,
    InvalidRequest,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Rejected => "rejected",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Network => "network",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidRequest => "invalid_request",
        };
        f.write_str(name)
    }
}
