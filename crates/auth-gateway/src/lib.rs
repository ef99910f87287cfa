//! Auth Gateway Library
//!
//! A gateway in front of a backend HTTP API:
//!
//! - Authenticates every request with a bearer token verified against the
//!   user pool's JWKS (loaded once at startup)
//! - Replaces the token with the caller's identity attributes
//! - Rewrites JSON keys between lowerCamel (callers) and snake_case (backend)
//! - Proxies the request upstream and rewrites the response
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware::Pipeline -> stages -> services::proxy
//! ```
//!
//! # Modules
//!
//! - `auth` - key set loading and token verification
//! - `case_transform` - JSON key casing conversion
//! - `config` - Service configuration from environment
//! - `context` - Startup-built service context
//! - `errors` - Error types with HTTP status code mapping
//! - `middleware` - The stage pipeline
//! - `observability` - Metrics and structured log records
//! - `routes` - Axum router setup
//! - `services` - Identity lookup and upstream transport

pub mod auth;
pub mod case_transform;
pub mod config;
pub mod context;
pub mod errors;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod services;
