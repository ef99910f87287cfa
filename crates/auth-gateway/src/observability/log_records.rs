//! Structured request/response log records.
//!
//! Records are serde structs serialized to a single JSON string field so a
//! log sink can index them without knowing the gateway's span layout.

use crate::case_transform::is_json;
use crate::services::identity::IdentityAttributes;
use axum::http::{header, request::Parts, HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use uuid::Uuid;

/// A logged header: its value, or for `authorization` only whether it was set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HeaderEntry {
    Present(bool),
    Value(String),
}

/// Copy headers for logging with the credential replaced by a presence flag.
///
/// `authorization` is always present in the result. Repeated headers are
/// joined with `", "`.
pub fn sanitize_headers(headers: &HeaderMap) -> BTreeMap<String, HeaderEntry> {
    let mut sanitized = BTreeMap::new();

    for name in headers.keys() {
        if name == header::AUTHORIZATION {
            continue;
        }
        let joined = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        sanitized.insert(name.as_str().to_string(), HeaderEntry::Value(joined));
    }

    sanitized.insert(
        header::AUTHORIZATION.as_str().to_string(),
        HeaderEntry::Present(headers.contains_key(header::AUTHORIZATION)),
    );

    sanitized
}

fn parse_json_body(body: &[u8]) -> Option<serde_json::Value> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice(body).ok()
}

/// What the gateway saw of an inbound request, after authentication.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogRecord {
    pub request_id: Uuid,
    pub method: String,
    pub uri: String,
    pub path: String,
    pub query: Option<String>,
    pub proto: String,
    pub host: Option<String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    /// Resolved caller; `None` until authentication has run.
    pub username: Option<String>,
    pub content_length: usize,
    pub headers: BTreeMap<String, HeaderEntry>,
    pub body: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl RequestLogRecord {
    pub fn new(
        request_id: Uuid,
        parts: &Parts,
        body: &[u8],
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        let header_str = |name: header::HeaderName| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string)
        };

        Self {
            request_id,
            method: parts.method.to_string(),
            uri: parts.uri.to_string(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(ToString::to_string),
            proto: format!("{:?}", parts.version),
            host: header_str(header::HOST)
                .or_else(|| parts.uri.authority().map(|a| a.to_string())),
            remote_addr: remote_addr.map(|addr| addr.to_string()),
            user_agent: header_str(header::USER_AGENT),
            username: None,
            content_length: body.len(),
            headers: sanitize_headers(&parts.headers),
            body: parse_json_body(body),
            timestamp: Utc::now(),
        }
    }

    pub fn with_identity(mut self, identity: Option<&IdentityAttributes>) -> Self {
        self.username = identity.map(|identity| identity.username.clone());
        self
    }

    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(record) => {
                tracing::info!(target: "gateway.access", request_id = %self.request_id, record = %record, "request");
            }
            Err(e) => {
                tracing::warn!(target: "gateway.access", request_id = %self.request_id, error = %e, "Failed to serialize request record");
            }
        }
    }
}

/// The rewritten response as returned to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseLogRecord {
    pub request_id: Uuid,
    pub status_code: u16,
    pub headers: BTreeMap<String, HeaderEntry>,
    pub response_body: serde_json::Value,
    pub content_length: usize,
}

impl ResponseLogRecord {
    /// JSON bodies are logged structurally, anything else as lossy text.
    pub fn new(request_id: Uuid, status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Self {
        let response_body = if is_json(body) {
            parse_json_body(body).unwrap_or(serde_json::Value::Null)
        } else {
            serde_json::Value::String(String::from_utf8_lossy(body).into_owned())
        };

        Self {
            request_id,
            status_code: status.as_u16(),
            headers: sanitize_headers(headers),
            response_body,
            content_length: body.len(),
        }
    }

    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(record) => {
                tracing::info!(target: "gateway.proxy", request_id = %self.request_id, record = %record, "response");
            }
            Err(e) => {
                tracing::warn!(target: "gateway.proxy", request_id = %self.request_id, error = %e, "Failed to serialize response record");
            }
        }
    }
}
