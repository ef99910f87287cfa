//! # Gateway Test Utilities
//!
//! Shared test utilities for the auth gateway.
//!
//! This crate provides:
//! - Deterministic Ed25519 signing keys and JWKS documents (`TestKeypair`)
//! - Token claim builders (`TestClaims`)
//! - An in-process gateway harness with mocked JWKS and upstream (`TestGateway`)
//! - In-memory capture of the JSON log records (`LogCapture`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let gateway = TestGateway::start().await?;
//!     let token = gateway.token_for("alice");
//!
//!     let response = gateway
//!         .router()
//!         .oneshot(gateway.request("GET", "/resource", Some(&token), None))
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod log_capture;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use log_capture::*;
pub use server_harness::*;
pub use token_builders::*;
