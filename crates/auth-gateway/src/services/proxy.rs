//! Reverse proxy transport.
//!
//! Forwards the fully processed request to the upstream backend and rewrites
//! the upstream response before it reaches the caller:
//!
//! 1. The response body is read completely (bounded by `MAX_BODY_BYTES`),
//!    with gzip, brotli and deflate encodings decoded by the client
//! 2. JSON bodies get their keys converted to lowerCamel
//! 3. Credential echoes, provider headers and hop-by-hop headers are stripped
//! 4. `Content-Type` and `Content-Length` are recomputed
//!
//! Responses that carry no body (HEAD, 1xx, 204, 304) keep the upstream's
//! entity headers untouched.
//!
//! Any failure on either leg fails the round trip with a 502. An unmodified,
//! still-encoded or truncated body is never forwarded.

use crate::case_transform::{convert, Direction};
use crate::errors::GatewayError;
use crate::middleware::PipelineContext;
use crate::observability::log_records::ResponseLogRecord;
use crate::observability::metrics;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tracing::{error, instrument, warn};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

const X_POWERED_BY: &str = "x-powered-by";
const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// HTTP client for the upstream backend.
#[derive(Clone)]
pub struct ProxyTransport {
    client: reqwest::Client,
    upstream_url: String,
    max_body_bytes: usize,
}

impl ProxyTransport {
    /// Create a transport for `upstream_url` (no trailing slash).
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Internal` if the HTTP client cannot be built.
    pub fn new(
        upstream_url: String,
        timeout: Duration,
        max_body_bytes: usize,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                error!(target: "gateway.proxy", error = %e, "Failed to build HTTP client");
                GatewayError::Internal(format!("upstream client: {}", e))
            })?;

        Ok(Self {
            client,
            upstream_url: upstream_url.trim_end_matches('/').to_string(),
            max_body_bytes,
        })
    }

    /// Upstream URL for an inbound URI: base + path + query.
    pub fn upstream_uri(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("{}{}", self.upstream_url, path_and_query)
    }

    /// Headers sent upstream, derived from the processed inbound headers.
    fn upstream_headers(&self, ctx: &PipelineContext) -> HeaderMap {
        let mut headers = ctx.parts.headers.clone();
        strip_hop_by_hop(&mut headers);

        let original_host = headers.remove(header::HOST);
        headers.remove(header::ACCEPT_ENCODING);
        // reqwest sets the length of the body it actually sends
        headers.remove(header::CONTENT_LENGTH);

        if let Some(host) = original_host {
            headers.insert(X_FORWARDED_HOST, host);
        }

        if let Some(addr) = ctx.remote_addr {
            let ip = addr.ip().to_string();
            let forwarded_for = match headers
                .get(X_FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
            {
                Some(prior) if !prior.is_empty() => format!("{}, {}", prior, ip),
                _ => ip,
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }

        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
        headers
    }

    /// Forward the processed request and return the rewritten response.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Upstream` if the backend is unreachable, the
    /// response body cannot be read, or the body cannot be rewritten.
    #[instrument(skip_all, fields(method = %ctx.parts.method, path = %ctx.parts.uri.path()))]
    pub async fn forward(&self, ctx: &PipelineContext) -> Result<Response, GatewayError> {
        let url = self.upstream_uri(&ctx.parts.uri);

        let mut response = self
            .client
            .request(ctx.parts.method.clone(), &url)
            .headers(self.upstream_headers(ctx))
            .body(ctx.body.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "gateway.proxy", error = %e, url = %url, "Upstream request failed");
                metrics::record_upstream("connect_error");
                GatewayError::Upstream(format!("request to {} failed: {}", url, e))
            })?;

        let status = response.status();
        let headers = std::mem::take(response.headers_mut());
        let body = self.read_body(response).await.map_err(|e| {
            metrics::record_upstream("read_error");
            e
        })?;

        let rewritten = rewrite_response(ctx.request_id, &ctx.parts.method, status, headers, body)
            .map_err(|e| {
                metrics::record_upstream("rewrite_error");
                e
            })?;

        metrics::record_upstream("success");
        Ok(rewritten)
    }

    /// Read the whole upstream body, failing if it exceeds the limit.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Bytes, GatewayError> {
        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes as u64 {
                warn!(target: "gateway.proxy", content_length = length, "Upstream body exceeds limit");
                return Err(GatewayError::Upstream(format!(
                    "upstream body of {} bytes exceeds limit",
                    length
                )));
            }
        }

        let mut buffer = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            warn!(target: "gateway.proxy", error = %e, "Failed to read upstream body");
            GatewayError::Upstream(format!("reading upstream body: {}", e))
        })? {
            if buffer.len() + chunk.len() > self.max_body_bytes {
                warn!(target: "gateway.proxy", "Upstream body exceeds limit");
                return Err(GatewayError::Upstream(
                    "upstream body exceeds limit".to_string(),
                ));
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer.freeze())
    }
}

/// Whether a response to `method` with `status` has a body to rewrite.
fn carries_body(method: &Method, status: StatusCode) -> bool {
    *method != Method::HEAD
        && !status.is_informational()
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
}

/// A `Content-Encoding` the client did not decode.
///
/// The client strips the header for every encoding it decodes, so anything
/// left other than `identity` means the body is still encoded.
fn undecoded_encoding(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::CONTENT_ENCODING)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()).trim().to_string())
        .find(|encoding| !encoding.is_empty() && !encoding.eq_ignore_ascii_case("identity"))
}

/// Rewrite the buffered upstream response for the caller.
fn rewrite_response(
    request_id: uuid::Uuid,
    method: &Method,
    status: StatusCode,
    mut headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    strip_hop_by_hop(&mut headers);
    headers.remove(header::AUTHORIZATION);
    headers.remove(X_POWERED_BY);

    if !carries_body(method, status) {
        ResponseLogRecord::new(request_id, status, &headers, &Bytes::new()).emit();
        return Ok(build_response(status, headers, Bytes::new()));
    }

    if let Some(encoding) = undecoded_encoding(&headers) {
        warn!(target: "gateway.proxy", content_encoding = %encoding, "Upstream body uses an unsupported encoding");
        return Err(GatewayError::Upstream(format!(
            "unsupported upstream content encoding: {}",
            encoding
        )));
    }

    let (body, content_type) = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(value) if value.is_object() => {
            let converted = serde_json::to_vec(&convert(value, Direction::ToExternal)).map_err(|e| {
                error!(target: "gateway.proxy", error = %e, "Failed to encode rewritten body");
                GatewayError::Upstream(format!("encoding rewritten body: {}", e))
            })?;
            (Bytes::from(converted), "application/json")
        }
        // JSON without a top-level object keeps its bytes
        Ok(_) => (body, "application/json"),
        Err(_) => (body, TEXT_PLAIN),
    };

    headers.remove(header::CONTENT_ENCODING);
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

    ResponseLogRecord::new(request_id, status, &headers, &body).emit();

    Ok(build_response(status, headers, body))
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
