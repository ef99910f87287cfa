//! Write requests must carry a JSON body.

use super::{is_write_method, Next, PipelineContext, Stage};
use crate::case_transform::is_json;
use crate::errors::GatewayError;
use axum::http::{header, HeaderValue};
use axum::response::Response;

pub struct BodyValidation;

#[async_trait::async_trait]
impl Stage for BodyValidation {
    fn name(&self) -> &'static str {
        "body_validation"
    }

    async fn handle(
        &self,
        ctx: &mut PipelineContext,
        next: Next<'_>,
    ) -> Result<Response, GatewayError> {
        if is_write_method(&ctx.parts.method) && ctx.has_body() {
            if !is_json(&ctx.body) {
                return Err(GatewayError::BadRequest(format!(
                    "{} body of {} bytes is not JSON",
                    ctx.parts.method,
                    ctx.body.len()
                )));
            }
            ctx.parts.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }

        next.run(ctx).await
    }
}
