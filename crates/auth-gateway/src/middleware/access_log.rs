//! Logs the sanitized, authenticated request.

use super::{Next, PipelineContext, Stage};
use crate::errors::GatewayError;
use crate::observability::log_records::RequestLogRecord;
use axum::response::Response;

pub struct AccessLogging;

#[async_trait::async_trait]
impl Stage for AccessLogging {
    fn name(&self) -> &'static str {
        "access_logging"
    }

    async fn handle(
        &self,
        ctx: &mut PipelineContext,
        next: Next<'_>,
    ) -> Result<Response, GatewayError> {
        RequestLogRecord::new(ctx.request_id, &ctx.parts, &ctx.body, ctx.remote_addr)
            .with_identity(ctx.identity.as_ref())
            .emit();
        next.run(ctx).await
    }
}
