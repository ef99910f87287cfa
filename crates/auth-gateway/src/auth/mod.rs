//! Bearer token authentication.
//!
//! The key set is fetched once at startup ([`jwks::KeySetLoader`]) and then
//! shared read-only by every request ([`jwt::verify`]).

pub mod claims;
pub mod jwks;
pub mod jwt;

pub use claims::{Audience, VerifiedClaims};
pub use jwks::{KeySet, KeySetError, KeySetLoader, VerificationKey};
pub use jwt::{verify, verify_at, TokenVerifier, VerifyError};
