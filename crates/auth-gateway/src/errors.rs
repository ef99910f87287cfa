//! Gateway error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Messages returned to callers are intentionally generic; the actual cause is
//! logged server-side when the response is built.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Caller-visible message for every authentication failure.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";

/// Gateway error type.
///
/// Maps to HTTP status codes:
/// - BadRequest: 400 Bad Request
/// - Unauthorized: 401 Unauthorized
/// - PayloadTooLarge: 413 Payload Too Large
/// - Internal: 500 Internal Server Error
/// - Upstream: 502 Bad Gateway
/// - Timeout: 504 Gateway Timeout
///
/// The `String` payloads carry the internal cause. They are logged, never
/// returned to the caller.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Request deadline exceeded: {0}")]
    Timeout(String),
}

impl GatewayError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Message written into the error envelope.
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "Body must be valid JSON",
            GatewayError::Unauthorized(_) => UNAUTHORIZED_MESSAGE,
            GatewayError::PayloadTooLarge(_) => "Payload too large",
            GatewayError::Internal(_) => "Internal server error",
            GatewayError::Upstream(_) => "Bad gateway",
            GatewayError::Timeout(_) => "Gateway timeout",
        }
    }
}

/// Error envelope: `{"error": <message>, "data": null}`.
#[derive(Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub data: Option<serde_json::Value>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            GatewayError::Internal(cause) => {
                tracing::error!(target: "gateway.errors", error = %cause, "Internal error");
            }
            GatewayError::Upstream(cause) => {
                tracing::error!(target: "gateway.errors", error = %cause, "Upstream round trip failed");
            }
            GatewayError::Timeout(cause) => {
                tracing::warn!(target: "gateway.errors", error = %cause, "Request deadline exceeded");
            }
            GatewayError::Unauthorized(cause) => {
                tracing::info!(target: "gateway.errors", reason = %cause, "Request rejected as unauthorized");
            }
            GatewayError::BadRequest(cause) | GatewayError::PayloadTooLarge(cause) => {
                tracing::info!(target: "gateway.errors", reason = %cause, status = %status, "Request rejected");
            }
        }

        let envelope = ErrorEnvelope {
            error: self.public_message().to_string(),
            data: None,
        };

        let mut response = (status, Json(envelope)).into_response();
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );

        response
    }
}
