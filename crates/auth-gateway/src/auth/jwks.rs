//! Key set loading for token verification.
//!
//! The JWKS (JSON Web Key Set) document is fetched once from the user pool's
//! `/.well-known/jwks.json` endpoint at startup and materialized into
//! verification keys. The resulting [`KeySet`] is immutable for the life of the
//! process; verification never goes back to the network.
//!
//! # Security
//!
//! - Only signature keys are accepted (`use` absent or `"sig"`)
//! - Keys that cannot be materialized are skipped, never partially trusted
//! - HTTPS is used for the derived well-known URL

use crate::auth::jwt::VerifyError;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Timeout for the one-time JWKS fetch.
const JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Build the well-known JWKS URL for a user pool.
pub fn well_known_jwks_url(region: &str, pool_id: &str) -> String {
    format!(
        "https://cognito-idp.{}.amazonaws.com/{}/.well-known/jwks.json",
        region, pool_id
    )
}

/// JSON Web Key as published in the JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type: "RSA", "EC" or "OKP".
    pub kty: String,

    /// Key ID - selects the key for a token.
    pub kid: String,

    /// Declared algorithm, if any.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name for EC/OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Asymmetric key families a verification key can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    EcP256,
    EcP384,
    Ed25519,
}

impl KeyFamily {
    /// Whether a key of this family can verify `alg`.
    pub fn supports(self, alg: Algorithm) -> bool {
        match self {
            KeyFamily::Rsa => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            KeyFamily::EcP256 => alg == Algorithm::ES256,
            KeyFamily::EcP384 => alg == Algorithm::ES384,
            KeyFamily::Ed25519 => alg == Algorithm::EdDSA,
        }
    }
}

/// A public key ready for signature verification.
#[derive(Clone)]
pub struct VerificationKey {
    kid: String,
    family: KeyFamily,
    declared_alg: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("declared_alg", &self.declared_alg)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Materialize a JWK into a verification key.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeySetError> {
        let invalid = |reason: &str| KeySetError::InvalidKey {
            kid: jwk.kid.clone(),
            reason: reason.to_string(),
        };

        if jwk.kid.is_empty() {
            return Err(invalid("empty kid"));
        }

        if let Some(key_use) = &jwk.key_use {
            if key_use != "sig" {
                return Err(invalid("key use is not 'sig'"));
            }
        }

        let declared_alg = match &jwk.alg {
            Some(alg) => Some(
                alg.parse::<Algorithm>()
                    .map_err(|_| invalid("unknown algorithm"))?,
            ),
            None => None,
        };

        let (family, decoding_key) = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or_else(|| invalid("missing n"))?;
                let e = jwk.e.as_deref().ok_or_else(|| invalid("missing e"))?;
                let key = DecodingKey::from_rsa_components(n, e)
                    .map_err(|_| invalid("invalid RSA components"))?;
                (KeyFamily::Rsa, key)
            }
            "EC" => {
                let family = match jwk.crv.as_deref() {
                    Some("P-256") => KeyFamily::EcP256,
                    Some("P-384") => KeyFamily::EcP384,
                    _ => return Err(invalid("unsupported EC curve")),
                };
                let x = jwk.x.as_deref().ok_or_else(|| invalid("missing x"))?;
                let y = jwk.y.as_deref().ok_or_else(|| invalid("missing y"))?;
                let key = DecodingKey::from_ec_components(x, y)
                    .map_err(|_| invalid("invalid EC components"))?;
                (family, key)
            }
            "OKP" => {
                if jwk.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                    return Err(invalid("unsupported OKP curve"));
                }
                let x = jwk.x.as_deref().ok_or_else(|| invalid("missing x"))?;
                let key = DecodingKey::from_ed_components(x)
                    .map_err(|_| invalid("invalid OKP public key"))?;
                (KeyFamily::Ed25519, key)
            }
            _ => return Err(invalid("unsupported key type")),
        };

        if let Some(alg) = declared_alg {
            if !family.supports(alg) {
                return Err(invalid("declared algorithm does not match key type"));
            }
        }

        Ok(Self {
            kid: jwk.kid.clone(),
            family,
            declared_alg,
            decoding_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Whether this key may verify a token signed with `alg`.
    pub fn accepts(&self, alg: Algorithm) -> bool {
        self.family.supports(alg) && self.declared_alg.map_or(true, |declared| declared == alg)
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Errors while loading the key set.
#[derive(Debug, Error)]
pub enum KeySetError {
    #[error("Failed to fetch JWKS from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to parse JWKS document: {0}")]
    Parse(String),

    #[error("Invalid key '{kid}': {reason}")]
    InvalidKey { kid: String, reason: String },

    #[error("JWKS document contains no usable signing keys")]
    Empty,
}

/// Immutable map of key ID to verification key.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: HashMap<String, VerificationKey>,
}

impl KeySet {
    /// Build a key set from a parsed document.
    ///
    /// Unusable keys are skipped with a warning. When several keys share a
    /// kid, the first usable one wins.
    pub fn from_document(document: &JwksDocument) -> Result<Self, KeySetError> {
        let mut keys = HashMap::with_capacity(document.keys.len());

        for jwk in &document.keys {
            match VerificationKey::from_jwk(jwk) {
                Ok(key) => {
                    if keys.contains_key(&key.kid) {
                        tracing::warn!(target: "gateway.auth.jwks", kid = %key.kid, "Duplicate kid in JWKS, keeping first");
                        continue;
                    }
                    keys.insert(key.kid.clone(), key);
                }
                Err(e) => {
                    tracing::warn!(target: "gateway.auth.jwks", error = %e, "Skipping unusable JWK");
                }
            }
        }

        if keys.is_empty() {
            return Err(KeySetError::Empty);
        }

        Ok(Self { keys })
    }

    /// Parse a raw JWKS document.
    pub fn from_json(bytes: &[u8]) -> Result<Self, KeySetError> {
        let document: JwksDocument =
            serde_json::from_slice(bytes).map_err(|e| KeySetError::Parse(e.to_string()))?;
        Self::from_document(&document)
    }

    /// Exact-match lookup by key ID.
    pub fn lookup(&self, kid: &str) -> Result<&VerificationKey, VerifyError> {
        self.keys.get(kid).ok_or(VerifyError::KeyNotFound)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

/// One-shot loader for the key set.
pub struct KeySetLoader {
    http_client: reqwest::Client,
}

impl Default for KeySetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySetLoader {
    pub fn new() -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(JWKS_FETCH_TIMEOUT_SECONDS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gateway.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self { http_client }
    }

    /// Load the key set for a user pool from its well-known endpoint.
    pub async fn load(&self, region: &str, pool_id: &str) -> Result<KeySet, KeySetError> {
        self.load_from_url(&well_known_jwks_url(region, pool_id))
            .await
    }

    /// Load the key set from an explicit JWKS URL.
    #[instrument(skip(self))]
    pub async fn load_from_url(&self, url: &str) -> Result<KeySet, KeySetError> {
        tracing::info!(target: "gateway.auth.jwks", url = %url, "Fetching JWKS");

        let fetch_error = |reason: String| KeySetError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self.http_client.get(url).send().await.map_err(|e| {
            tracing::error!(target: "gateway.auth.jwks", error = %e, "Failed to fetch JWKS");
            fetch_error(e.to_string())
        })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "gateway.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(fetch_error(format!("status {}", response.status())));
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::error!(target: "gateway.auth.jwks", error = %e, "Failed to read JWKS body");
            fetch_error(e.to_string())
        })?;

        let key_set = KeySet::from_json(&body)?;

        tracing::info!(
            target: "gateway.auth.jwks",
            key_count = key_set.len(),
            "JWKS loaded"
        );

        Ok(key_set)
    }
}
