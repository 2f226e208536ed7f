//! Construction-time client configuration.
//!
//! Defaults match the course mock server. `from_env` overlays `ECOMARKET_*`
//! variables; `validate` is run by every constructor that consumes a config.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::url::{UrlBuilder, UrlError};

pub const ENV_BASE_URL: &str = "ECOMARKET_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "ECOMARKET_TIMEOUT_SECS";
pub const ENV_MAX_CONCURRENT: &str = "ECOMARKET_MAX_CONCURRENT";
pub const ENV_MAX_PER_SECOND: &str = "ECOMARKET_MAX_PER_SECOND";
pub const ENV_TOKEN: &str = "ECOMARKET_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: cannot parse '{value}'")]
    Parse { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("base_url: {0}")]
    BaseUrl(#[from] UrlError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Default per-request timeout in seconds.
    pub timeout_secs: f64,
    pub max_concurrent: usize,
    pub max_per_second: f64,
    pub auth_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 10.0,
            max_concurrent: 10,
            max_per_second: 20.0,
            auth_token: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like `from_env`, with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_BASE_URL) {
            config.base_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            config.timeout_secs = parse(ENV_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_CONCURRENT) {
            config.max_concurrent = parse(ENV_MAX_CONCURRENT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_PER_SECOND) {
            config.max_per_second = parse(ENV_MAX_PER_SECOND, &raw)?;
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|t| !t.is_empty()) {
            config.auth_token = Some(token);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
            return Err(ConfigError::NotPositive("timeout_secs"));
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::NotPositive("max_concurrent"));
        }
        if !(self.max_per_second.is_finite() && self.max_per_second > 0.0) {
            return Err(ConfigError::NotPositive("max_per_second"));
        }
        UrlBuilder::new(&self.base_url)?;
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Parse {
        key,
        value: raw.to_string(),
    })
}
