//! Service context built once at startup.
//!
//! Everything a request needs from outside itself: configuration, the
//! read-only key set (through the verifier), the identity resolver and the
//! upstream transport. Nothing in here is mutated after construction.

use crate::auth::{KeySet, TokenVerifier};
use crate::config::Config;
use crate::errors::GatewayError;
use crate::services::identity::IdentityResolver;
use crate::services::proxy::ProxyTransport;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct GatewayContext {
    pub config: Arc<Config>,
    pub verifier: TokenVerifier,
    pub identity: Arc<dyn IdentityResolver>,
    pub proxy: Arc<ProxyTransport>,
}

impl GatewayContext {
    /// # Errors
    ///
    /// Returns `GatewayError::Internal` if the upstream client cannot be built.
    pub fn new(
        config: Config,
        key_set: Arc<KeySet>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Result<Self, GatewayError> {
        let verifier = TokenVerifier::new(key_set, config.client_id.clone());
        let proxy = ProxyTransport::new(
            config.upstream_url.clone(),
            Duration::from_secs(config.upstream_timeout_seconds),
            config.max_body_bytes,
        )?;

        Ok(Self {
            config: Arc::new(config),
            verifier,
            identity,
            proxy: Arc::new(proxy),
        })
    }
}
