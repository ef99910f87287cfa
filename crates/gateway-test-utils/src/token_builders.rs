//! Builder for test token claims.

use chrono::{Duration, Utc};
use serde::Serialize;

/// Claims carried by test tokens.
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaims::for_user("alice")
///     .with_audience("test-client")
///     .expires_in(3600);
/// let token = keypair.sign_token(&claims);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct TestClaims {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    pub token_use: String,
}

impl TestClaims {
    /// Valid for an hour, issued now, no audience.
    pub fn for_user(username: &str) -> Self {
        let now = Utc::now();
        Self {
            sub: format!("sub-{}", username),
            username: Some(username.to_string()),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            nbf: None,
            aud: None,
            token_use: "access".to_string(),
        }
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.aud = Some(audience.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for already expired).
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Not valid until `seconds` from now.
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    pub fn without_username(mut self) -> Self {
        self.username = None;
        self
    }
}
