//! Service layer for the gateway.
//!
//! This module contains the clients for the systems the gateway talks to.
//!
//! # Components
//!
//! - `identity` - account attribute lookup for authenticated users
//! - `proxy` - upstream dispatch and response rewriting

pub mod identity;
pub mod proxy;

pub use identity::{
    AttributeField, CognitoIdentityResolver, IdentityAttributes, IdentityError, IdentityResolver,
};
pub use proxy::ProxyTransport;
