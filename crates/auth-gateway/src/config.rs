//! Gateway configuration.
//!
//! Configuration is loaded from environment variables. Credentials for the
//! user pool admin API come from the standard AWS provider chain, not from
//! here.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default upstream request timeout in seconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 30;

/// Default whole-request deadline in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 60;

/// Default maximum buffered body size (10 MiB), applied to both legs.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port; the server binds `0.0.0.0:<port>`.
    pub port: u16,

    /// Upstream backend base URL (e.g. "http://backend:8080").
    pub upstream_url: String,

    /// User pool identifier.
    pub pool_id: String,

    /// App client identifier, compared against the token `aud` claim.
    pub client_id: String,

    /// Deployment region (e.g. "us-east-1").
    pub region: String,

    /// Explicit JWKS URL. When unset the URL is derived from region and pool.
    pub jwks_url: Option<String>,

    /// Override for the user pool admin API endpoint. When unset the
    /// regional endpoint is used.
    pub identity_endpoint: Option<String>,

    /// Timeout for the upstream round trip.
    pub upstream_timeout_seconds: u64,

    /// Deadline for the whole request, enforced by the pipeline.
    pub request_timeout_seconds: u64,

    /// Maximum request/response body size buffered by the gateway.
    pub max_body_bytes: usize,

    /// Optional Prometheus exporter listen address.
    pub metrics_bind_address: Option<String>,

    /// Seconds to wait after a shutdown signal before exiting.
    pub drain_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid upstream URL: {0}")]
    InvalidUpstreamUrl(String),

    #[error("Invalid numeric setting: {0}")]
    InvalidNumber(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |key: &str| -> Result<String, ConfigError> {
            vars.get(key)
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let port_str = required("PORT")?;
        let port: u16 = port_str.parse().map_err(|e| {
            ConfigError::InvalidPort(format!(
                "PORT must be an integer between 0 and 65535, got '{}': {}",
                port_str, e
            ))
        })?;

        let upstream_url = required("URL")?;
        if !(upstream_url.starts_with("http://") || upstream_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUpstreamUrl(format!(
                "URL must start with http:// or https://, got '{}'",
                upstream_url
            )));
        }
        let upstream_url = upstream_url.trim_end_matches('/').to_string();

        let pool_id = required("POOL_ID")?;
        let client_id = required("CLIENT_ID")?;
        let region = required("AWS_REGION")?;

        let jwks_url = vars.get("JWKS_URL").filter(|v| !v.is_empty()).cloned();

        let identity_endpoint = vars.get("IDENTITY_URL").filter(|v| !v.is_empty()).cloned();

        let upstream_timeout_seconds = parse_positive(
            vars,
            "UPSTREAM_TIMEOUT_SECONDS",
            DEFAULT_UPSTREAM_TIMEOUT_SECONDS,
        )?;
        let request_timeout_seconds = parse_positive(
            vars,
            "REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
        )?;
        let max_body_bytes = parse_positive(vars, "MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES as u64)?;
        let max_body_bytes = usize::try_from(max_body_bytes).map_err(|e| {
            ConfigError::InvalidNumber(format!("MAX_BODY_BYTES is out of range: {}", e))
        })?;

        let metrics_bind_address = vars
            .get("METRICS_BIND_ADDRESS")
            .filter(|v| !v.is_empty())
            .cloned();

        let drain_seconds = match vars.get("DRAIN_SECONDS") {
            Some(value_str) => value_str.parse().map_err(|e| {
                ConfigError::InvalidNumber(format!(
                    "DRAIN_SECONDS must be a non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => 0,
        };

        Ok(Config {
            port,
            upstream_url,
            pool_id,
            client_id,
            region,
            jwks_url,
            identity_endpoint,
            upstream_timeout_seconds,
            request_timeout_seconds,
            max_body_bytes,
            metrics_bind_address,
            drain_seconds,
        })
    }

    /// Address the HTTP listener binds to.
    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(key) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidNumber(format!(
            "{} must be a valid positive integer, got '{}': {}",
            key, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidNumber(format!(
            "{} must be greater than 0",
            key
        )));
    }

    Ok(value)
}
