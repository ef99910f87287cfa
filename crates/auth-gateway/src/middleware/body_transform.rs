//! Converts request body keys to the backend's snake_case.

use super::{Next, PipelineContext, Stage};
use crate::case_transform::{convert_body, Direction};
use crate::errors::GatewayError;
use axum::body::Bytes;
use axum::http::{header, HeaderValue};
use axum::response::Response;

pub struct RequestBodyTransform;

#[async_trait::async_trait]
impl Stage for RequestBodyTransform {
    fn name(&self) -> &'static str {
        "request_body_transform"
    }

    async fn handle(
        &self,
        ctx: &mut PipelineContext,
        next: Next<'_>,
    ) -> Result<Response, GatewayError> {
        if ctx.has_body() {
            let converted = convert_body(&ctx.body, Direction::ToBackend);
            ctx.parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(converted.len()));
            ctx.body = Bytes::from(converted);
        }

        next.run(ctx).await
    }
}
