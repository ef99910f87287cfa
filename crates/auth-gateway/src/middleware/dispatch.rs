//! Terminal stage: hands the processed request to the proxy transport.

use super::{Next, PipelineContext, Stage};
use crate::errors::GatewayError;
use crate::services::proxy::ProxyTransport;
use axum::response::Response;
use std::sync::Arc;

pub struct Dispatch {
    proxy: Arc<ProxyTransport>,
}

impl Dispatch {
    pub fn new(proxy: Arc<ProxyTransport>) -> Self {
        Self { proxy }
    }
}

#[async_trait::async_trait]
impl Stage for Dispatch {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    async fn handle(
        &self,
        ctx: &mut PipelineContext,
        _next: Next<'_>,
    ) -> Result<Response, GatewayError> {
        self.proxy.forward(ctx).await
    }
}
