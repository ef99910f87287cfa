//! Bearer token verification.
//!
//! Verifies a token against the immutable [`KeySet`] loaded at startup and
//! checks its time and audience claims.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only asymmetric algorithms are accepted (RS*, PS*, ES*, EdDSA)
//! - An unknown `kid` fails immediately; there is no fallback fetch
//! - `exp`, `nbf` and `iat` are enforced with no clock-skew leeway
//! - Callers collapse every failure into one opaque outcome

use crate::auth::claims::{TokenClaims, VerifiedClaims};
use crate::auth::jwks::KeySet;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use thiserror::Error;

/// Maximum accepted token size in bytes (8KB).
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// Why a token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("token is malformed")]
    Malformed,

    #[error("no key matches the token kid")]
    KeyNotFound,

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token is expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token audience does not match client id")]
    AudienceMismatch,

    #[error("token carries no username")]
    MissingUsername,
}

impl VerifyError {
    /// Stable label for metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            VerifyError::Malformed => "malformed",
            VerifyError::KeyNotFound => "key_not_found",
            VerifyError::SignatureInvalid => "signature_invalid",
            VerifyError::Expired => "expired",
            VerifyError::NotYetValid => "not_yet_valid",
            VerifyError::AudienceMismatch => "audience_mismatch",
            VerifyError::MissingUsername => "missing_username",
        }
    }
}

/// Token verifier bound to a key set and the expected audience.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    key_set: std::sync::Arc<KeySet>,
    expected_audience: String,
}

impl TokenVerifier {
    pub fn new(key_set: std::sync::Arc<KeySet>, expected_audience: impl Into<String>) -> Self {
        Self {
            key_set,
            expected_audience: expected_audience.into(),
        }
    }

    /// Verify `token` against the current time.
    pub fn verify(&self, token: &str) -> Result<VerifiedClaims, VerifyError> {
        verify(token, &self.key_set, &self.expected_audience)
    }
}

/// Verify a token against the current wall-clock time.
pub fn verify(
    token: &str,
    key_set: &KeySet,
    expected_audience: &str,
) -> Result<VerifiedClaims, VerifyError> {
    verify_at(
        token,
        key_set,
        expected_audience,
        chrono::Utc::now().timestamp(),
    )
}

/// Deterministic verification against an explicit `now` (Unix seconds).
pub fn verify_at(
    token: &str,
    key_set: &KeySet,
    expected_audience: &str,
    now: i64,
) -> Result<VerifiedClaims, VerifyError> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        tracing::debug!(
            target: "gateway.auth.jwt",
            token_size = token.len(),
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(VerifyError::Malformed);
    }

    if token.split('.').count() != 3 {
        tracing::debug!(target: "gateway.auth.jwt", "Token rejected: not three segments");
        return Err(VerifyError::Malformed);
    }

    let header = decode_header(token).map_err(|e| {
        tracing::debug!(target: "gateway.auth.jwt", error = %e, "Failed to decode token header");
        VerifyError::Malformed
    })?;

    if !is_asymmetric(header.alg) {
        tracing::debug!(target: "gateway.auth.jwt", alg = ?header.alg, "Token rejected: symmetric algorithm");
        return Err(VerifyError::Malformed);
    }

    let kid = header
        .kid
        .as_deref()
        .filter(|kid| !kid.is_empty())
        .ok_or_else(|| {
            tracing::debug!(target: "gateway.auth.jwt", "Token rejected: missing kid");
            VerifyError::Malformed
        })?;

    let key = key_set.lookup(kid).map_err(|e| {
        tracing::debug!(target: "gateway.auth.jwt", kid = %kid, "Token kid not in key set");
        e
    })?;

    if !key.accepts(header.alg) {
        tracing::debug!(
            target: "gateway.auth.jwt",
            kid = %kid,
            alg = ?header.alg,
            "Token algorithm not allowed for key"
        );
        return Err(VerifyError::SignatureInvalid);
    }

    // Signature only; time and audience claims are checked below without leeway
    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.required_spec_claims.clear();

    let token_data =
        decode::<TokenClaims>(token, key.decoding_key(), &validation).map_err(|e| {
            tracing::debug!(target: "gateway.auth.jwt", error = %e, "Token verification failed");
            match e.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => VerifyError::Malformed,
                _ => VerifyError::SignatureInvalid,
            }
        })?;

    let claims = token_data.claims;

    let exp = claims.exp.ok_or_else(|| {
        tracing::debug!(target: "gateway.auth.jwt", "Token rejected: missing exp");
        VerifyError::Expired
    })?;
    if exp <= now {
        tracing::debug!(target: "gateway.auth.jwt", exp = exp, now = now, "Token rejected: expired");
        return Err(VerifyError::Expired);
    }

    for (name, value) in [("nbf", claims.nbf), ("iat", claims.iat)] {
        if let Some(ts) = value {
            if ts > now {
                tracing::debug!(target: "gateway.auth.jwt", claim = name, value = ts, now = now, "Token rejected: not yet valid");
                return Err(VerifyError::NotYetValid);
            }
        }
    }

    match &claims.aud {
        Some(aud) if !aud.contains(expected_audience) => {
            tracing::debug!(target: "gateway.auth.jwt", "Token rejected: audience mismatch");
            return Err(VerifyError::AudienceMismatch);
        }
        Some(_) => {}
        None => {
            // Tokens without `aud` (e.g. access tokens) pass the audience check
            tracing::debug!(target: "gateway.auth.jwt", "Token has no aud claim, audience check skipped");
        }
    }

    let username = claims
        .derived_username()
        .map(ToString::to_string)
        .ok_or_else(|| {
            tracing::debug!(target: "gateway.auth.jwt", "Token rejected: no username claim");
            VerifyError::MissingUsername
        })?;

    tracing::debug!(target: "gateway.auth.jwt", "Token verified successfully");
    Ok(VerifiedClaims::new(username, claims, exp))
}

fn is_asymmetric(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use ring::signature::{Ed25519KeyPair, KeyPair};

    const NOW: i64 = 1_700_000_000;
    const AUDIENCE: &str = "client-xyz";

    struct Signer {
        kid: String,
        seed: [u8; 32],
    }

    impl Signer {
        fn new(seed_byte: u8, kid: &str) -> Self {
            let mut seed = [0u8; 32];
            for (i, byte) in seed.iter_mut().enumerate() {
                *byte = seed_byte.wrapping_mul(i as u8 + 1).wrapping_add(i as u8);
            }
            Self {
                kid: kid.to_string(),
                seed,
            }
        }

        fn public_x(&self) -> String {
            let pair = Ed25519KeyPair::from_seed_unchecked(&self.seed).unwrap();
            URL_SAFE_NO_PAD.encode(pair.public_key().as_ref())
        }

        fn pkcs8(&self) -> Vec<u8> {
            let mut pkcs8 = vec![
                0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22,
                0x04, 0x20,
            ];
            pkcs8.extend_from_slice(&self.seed);
            pkcs8
        }

        fn sign(&self, claims: &serde_json::Value) -> String {
            let mut header = Header::new(Algorithm::EdDSA);
            header.kid = Some(self.kid.clone());
            encode(&header, claims, &EncodingKey::from_ed_der(&self.pkcs8())).unwrap()
        }

        fn key_set(&self) -> KeySet {
            let doc = serde_json::json!({"keys": [{
                "kty": "OKP",
                "kid": self.kid,
                "crv": "Ed25519",
                "x": self.public_x(),
                "alg": "EdDSA",
                "use": "sig"
            }]});
            KeySet::from_json(doc.to_string().as_bytes()).unwrap()
        }
    }

    fn valid_claims() -> serde_json::Value {
        serde_json::json!({
            "sub": "0c7f1b2e-user",
            "username": "alice",
            "exp": NOW + 3600,
            "iat": NOW - 60,
            "aud": AUDIENCE,
            "token_use": "id"
        })
    }

    fn b64(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string().as_bytes())
    }

    #[test]
    fn test_accepts_valid_token() {
        let signer = Signer::new(1, "key-1");
        let token = signer.sign(&valid_claims());

        let claims = verify_at(&token, &signer.key_set(), AUDIENCE, NOW).unwrap();

        assert_eq!(claims.username(), "alice");
        assert_eq!(claims.subject(), Some("0c7f1b2e-user"));
        assert_eq!(claims.expires_at(), NOW + 3600);
        assert_eq!(claims.claim("token_use"), Some(&serde_json::json!("id")));
    }

    #[test]
    fn test_unknown_kid_is_key_not_found_before_signature_check() {
        let signer = Signer::new(1, "key-1");
        // Garbage signature: reaching the signature check would yield SignatureInvalid
        let header = serde_json::json!({"alg": "EdDSA", "typ": "JWT", "kid": "rotated-away"});
        let token = format!(
            "{}.{}.not-a-signature",
            b64(&header),
            b64(&valid_claims())
        );

        let result = verify_at(&token, &signer.key_set(), AUDIENCE, NOW);
        assert_eq!(result.unwrap_err(), VerifyError::KeyNotFound);
    }

    #[test]
    fn test_rejects_expired_token_with_valid_signature_and_audience() {
        let signer = Signer::new(1, "key-1");
        let mut claims = valid_claims();
        claims["exp"] = serde_json::json!(NOW - 1);
        let token = signer.sign(&claims);

        let result = verify_at(&token, &signer.key_set(), AUDIENCE, NOW);
        assert_eq!(result.unwrap_err(), VerifyError::Expired);
    }

    #[test]
    fn test_exp_equal_to_now_is_expired() {
        let signer = Signer::new(1, "key-1");
        let mut claims = valid_claims();
        claims["exp"] = serde_json::json!(NOW);
        let token = signer.sign(&claims);

        let result = verify_at(&token, &signer.key_set(), AUDIENCE, NOW);
        assert_eq!(result.unwrap_err(), VerifyError::Expired);
    }

    #[test]
    fn test_missing_exp_is_rejected() {
        let signer = Signer::new(1, "key-1");
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("exp");
        let token = signer.sign(&claims);

        let result = verify_at(&token, &signer.key_set(), AUDIENCE, NOW);
        assert_eq!(result.unwrap_err(), VerifyError::Expired);
    }

    #[test]
    fn test_future_nbf_and_iat_are_not_yet_valid() {
        let signer = Signer::new(1, "key-1");

        let mut claims = valid_claims();
        claims["nbf"] = serde_json::json!(NOW + 1);
        let token = signer.sign(&claims);
        assert_eq!(
            verify_at(&token, &signer.key_set(), AUDIENCE, NOW).unwrap_err(),
            VerifyError::NotYetValid
        );

        let mut claims = valid_claims();
        claims["iat"] = serde_json::json!(NOW + 1);
        let token = signer.sign(&claims);
        assert_eq!(
            verify_at(&token, &signer.key_set(), AUDIENCE, NOW).unwrap_err(),
            VerifyError::NotYetValid
        );

        // Boundary: equal to now is valid
        let mut claims = valid_claims();
        claims["nbf"] = serde_json::json!(NOW);
        claims["iat"] = serde_json::json!(NOW);
        let token = signer.sign(&claims);
        assert!(verify_at(&token, &signer.key_set(), AUDIENCE, NOW).is_ok());
    }

    #[test]
    fn test_audience_mismatch() {
        let signer = Signer::new(1, "key-1");
        let mut claims = valid_claims();
        claims["aud"] = serde_json::json!("some-other-client");
        let token = signer.sign(&claims);

        let result = verify_at(&token, &signer.key_set(), AUDIENCE, NOW);
        assert_eq!(result.unwrap_err(), VerifyError::AudienceMismatch);
    }

    #[test]
    fn test_audience_array_containing_client_is_accepted() {
        let signer = Signer::new(1, "key-1");
        let mut claims = valid_claims();
        claims["aud"] = serde_json::json!(["other", AUDIENCE]);
        let token = signer.sign(&claims);

        assert!(verify_at(&token, &signer.key_set(), AUDIENCE, NOW).is_ok());
    }

    #[test]
    fn test_missing_audience_passes() {
        let signer = Signer::new(1, "key-1");
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("aud");
        let token = signer.sign(&claims);

        assert!(verify_at(&token, &signer.key_set(), AUDIENCE, NOW).is_ok());
    }

    #[test]
    fn test_missing_username_is_rejected() {
        let signer = Signer::new(1, "key-1");
        let mut claims = valid_claims();
        claims["username"] = serde_json::json!("");
        let token = signer.sign(&claims);

        let result = verify_at(&token, &signer.key_set(), AUDIENCE, NOW);
        assert_eq!(result.unwrap_err(), VerifyError::MissingUsername);
    }

    #[test]
    fn test_signature_from_other_key_is_invalid() {
        let trusted = Signer::new(1, "key-1");
        let attacker = Signer::new(2, "key-1");
        let token = attacker.sign(&valid_claims());

        let result = verify_at(&token, &trusted.key_set(), AUDIENCE, NOW);
        assert_eq!(result.unwrap_err(), VerifyError::SignatureInvalid);
    }

    #[test]
    fn test_tampered_payload_is_invalid() {
        let signer = Signer::new(1, "key-1");
        let token = signer.sign(&valid_claims());
        let mut parts: Vec<&str> = token.split('.').collect();

        let mut claims = valid_claims();
        claims["username"] = serde_json::json!("mallory");
        let forged_payload = b64(&claims);
        parts[1] = &forged_payload;

        let result = verify_at(&parts.join("."), &signer.key_set(), AUDIENCE, NOW);
        assert_eq!(result.unwrap_err(), VerifyError::SignatureInvalid);
    }

    #[test]
    fn test_hmac_algorithm_is_malformed() {
        let signer = Signer::new(1, "key-1");
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("key-1".to_string());
        let token = encode(
            &header,
            &valid_claims(),
            &EncodingKey::from_secret(b"shared"),
        )
        .unwrap();

        let result = verify_at(&token, &signer.key_set(), AUDIENCE, NOW);
        assert_eq!(result.unwrap_err(), VerifyError::Malformed);
    }

    #[test]
    fn test_algorithm_not_matching_key_is_invalid() {
        let signer = Signer::new(1, "key-1");
        let header = serde_json::json!({"alg": "RS256", "kid": "key-1"});
        let token = format!("{}.{}.c2ln", b64(&header), b64(&valid_claims()));

        let result = verify_at(&token, &signer.key_set(), AUDIENCE, NOW);
        assert_eq!(result.unwrap_err(), VerifyError::SignatureInvalid);
    }

    #[test]
    fn test_malformed_tokens() {
        let signer = Signer::new(1, "key-1");
        let key_set = signer.key_set();

        let no_kid = format!(
            "{}.{}.sig",
            b64(&serde_json::json!({"alg": "EdDSA"})),
            b64(&valid_claims())
        );

        for token in [
            "",
            "single",
            "only.two",
            "not.a.valid.jwt",
            "!!!invalid!!!.payload.signature",
            no_kid.as_str(),
        ] {
            assert_eq!(
                verify_at(token, &key_set, AUDIENCE, NOW).unwrap_err(),
                VerifyError::Malformed,
                "token {:?} should be malformed",
                token
            );
        }
    }

    #[test]
    fn test_oversized_token_is_malformed() {
        let signer = Signer::new(1, "key-1");
        let token = format!("{}.b.c", "a".repeat(MAX_TOKEN_SIZE_BYTES));

        let result = verify_at(&token, &signer.key_set(), AUDIENCE, NOW);
        assert_eq!(result.unwrap_err(), VerifyError::Malformed);
    }

    #[test]
    fn test_token_verifier_uses_wall_clock() {
        let signer = Signer::new(3, "key-3");
        let now = chrono::Utc::now().timestamp();
        let mut claims = valid_claims();
        claims["exp"] = serde_json::json!(now + 600);
        claims["iat"] = serde_json::json!(now - 5);
        let token = signer.sign(&claims);

        let verifier = TokenVerifier::new(std::sync::Arc::new(signer.key_set()), AUDIENCE);
        assert_eq!(verifier.verify(&token).unwrap().username(), "alice");
    }
}
