//! Outermost stage: wraps the whole chain and reports elapsed time.

use super::{Next, PipelineContext, Stage};
use crate::errors::GatewayError;
use crate::observability::metrics;
use axum::http::StatusCode;
use axum::response::Response;

pub struct Timing;

/// Log the finished request and record its metrics.
///
/// Also called by the pipeline for requests that end before or around this
/// stage (oversized body, expired deadline).
pub(crate) fn record_finished(ctx: &PipelineContext, status: StatusCode) {
    let elapsed = ctx.started_at.elapsed();

    metrics::record_request(ctx.parts.method.as_str(), status.as_u16(), elapsed);
    tracing::info!(
        target: "gateway.pipeline",
        request_id = %ctx.request_id,
        status = status.as_u16(),
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "Finished with request"
    );
}

#[async_trait::async_trait]
impl Stage for Timing {
    fn name(&self) -> &'static str {
        "timing"
    }

    async fn handle(
        &self,
        ctx: &mut PipelineContext,
        next: Next<'_>,
    ) -> Result<Response, GatewayError> {
        tracing::info!(
            target: "gateway.pipeline",
            request_id = %ctx.request_id,
            method = %ctx.parts.method,
            path = %ctx.parts.uri.path(),
            "Starting a new request"
        );

        let result = next.run(ctx).await;

        let status = match &result {
            Ok(response) => response.status(),
            Err(e) => e.status_code(),
        };
        record_finished(ctx, status);

        result
    }
}
