//! Authentication stage.
//!
//! Extracts the Bearer token from the Authorization header, verifies it
//! against the key set, resolves the caller's identity, and replaces the
//! Authorization header with the serialized identity attributes so the raw
//! token never reaches the backend.
//!
//! # Authorization Header Format
//!
//! ```text
//! Authorization: Bearer <token>
//! ```
//!
//! Every failure is the same 401 "Unauthorized"; the specific cause is only
//! logged and counted.

use super::{Next, PipelineContext, Stage};
use crate::auth::TokenVerifier;
use crate::errors::GatewayError;
use crate::observability::metrics;
use crate::services::identity::IdentityResolver;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::Response;
use std::sync::Arc;
use tracing::instrument;

pub struct Authentication {
    verifier: TokenVerifier,
    identity: Arc<dyn IdentityResolver>,
}

impl Authentication {
    pub fn new(verifier: TokenVerifier, identity: Arc<dyn IdentityResolver>) -> Self {
        Self { verifier, identity }
    }
}

fn reject(reason: &'static str) -> GatewayError {
    metrics::record_auth_failure(reason);
    GatewayError::Unauthorized(reason.to_string())
}

/// Token from `Authorization: Bearer <token>`.
///
/// The value must be exactly two space-separated parts; the scheme is
/// matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Result<&str, GatewayError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| reject("missing_header"))?
        .to_str()
        .map_err(|_| reject("malformed_header"))?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None)
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() =>
        {
            Ok(token)
        }
        _ => Err(reject("malformed_header")),
    }
}

#[async_trait::async_trait]
impl Stage for Authentication {
    fn name(&self) -> &'static str {
        "authentication"
    }

    #[instrument(skip_all, name = "gateway.middleware.auth")]
    async fn handle(
        &self,
        ctx: &mut PipelineContext,
        next: Next<'_>,
    ) -> Result<Response, GatewayError> {
        let token = bearer_token(&ctx.parts.headers)?;

        let claims = self.verifier.verify(token).map_err(|e| {
            tracing::debug!(target: "gateway.middleware.auth", error = %e, "Token rejected");
            reject(e.as_label())
        })?;

        let identity = self
            .identity
            .resolve(claims.username())
            .await
            .map_err(|e| {
                tracing::warn!(target: "gateway.middleware.auth", error = %e, "Identity lookup failed");
                reject(e.as_label())
            })?;

        let serialized = serde_json::to_vec(&identity).map_err(|e| {
            GatewayError::Internal(format!("serializing identity attributes: {}", e))
        })?;
        let value = HeaderValue::from_bytes(&serialized).map_err(|e| {
            GatewayError::Internal(format!("identity attributes are not a valid header: {}", e))
        })?;

        ctx.parts.headers.insert(header::AUTHORIZATION, value);
        ctx.identity = Some(identity);

        tracing::debug!(target: "gateway.middleware.auth", username = %claims.username(), "Request authenticated");
        next.run(ctx).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn headers_with(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_bearer_token_extracted() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(bearer_token(&headers_with("bearer abc")).unwrap(), "abc");
    }

    #[test]
    fn test_malformed_headers_are_unauthorized() {
        for value in ["", "Bearer", "Bearer ", "Basic abc", "Bearer a b", "abc", "Bearer  abc"] {
            let err = bearer_token(&headers_with(value)).unwrap_err();
            assert!(
                matches!(err, GatewayError::Unauthorized(_)),
                "{:?} should be unauthorized",
                value
            );
        }
    }

    #[test]
    fn test_missing_header_is_unauthorized() {
        let err = bearer_token(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(_)));
        assert_eq!(err.public_message(), "Unauthorized");
    }
}
