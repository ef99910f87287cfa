//! Token claims.
//!
//! [`TokenClaims`] is the raw payload shape; [`VerifiedClaims`] can only be
//! produced by a successful verification in [`crate::auth::jwt`]. The subject
//! is redacted in Debug output to keep it out of logs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `aud` claim: a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    /// Exact string match against any listed audience.
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Raw token payload as decoded after the signature check.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    /// Username claim carried by ID tokens.
    #[serde(default, rename = "cognito:username")]
    pub provider_username: Option<String>,

    #[serde(default)]
    pub exp: Option<i64>,

    #[serde(default)]
    pub nbf: Option<i64>,

    #[serde(default)]
    pub iat: Option<i64>,

    #[serde(default)]
    pub aud: Option<Audience>,

    /// Provider-specific claims (`token_use`, `scope`, `client_id`, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenClaims {
    /// The username the token was issued to, if one can be derived.
    pub fn derived_username(&self) -> Option<&str> {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.provider_username.as_deref().filter(|u| !u.is_empty()))
    }
}

/// Signature-checked, time-checked, audience-checked claims.
#[derive(Clone)]
pub struct VerifiedClaims {
    username: String,
    subject: Option<String>,
    expires_at: i64,
    audience: Option<Audience>,
    extra: serde_json::Map<String, serde_json::Value>,
}

impl VerifiedClaims {
    pub(crate) fn new(username: String, claims: TokenClaims, expires_at: i64) -> Self {
        Self {
            username,
            subject: claims.sub,
            expires_at,
            audience: claims.aud,
            extra: claims.extra,
        }
    }

    /// Non-empty username from the token.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Expiry as Unix epoch seconds.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn audience(&self) -> Option<&Audience> {
        self.audience.as_ref()
    }

    /// Look up a provider-specific claim.
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}

impl fmt::Debug for VerifiedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedClaims")
            .field("username", &self.username)
            .field("subject", &self.subject.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}
