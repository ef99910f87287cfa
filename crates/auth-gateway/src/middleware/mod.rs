//! Request-processing pipeline.
//!
//! A [`Pipeline`] is an immutable, ordered list of [`Stage`]s built once at
//! startup. Each stage gets the per-request [`PipelineContext`] and a [`Next`]
//! handle; it either mutates the context and calls `next.run(ctx)`, or returns
//! `Err(GatewayError)` to terminate. The first stage is the outermost: it sees
//! the request first and the response last.
//!
//! # Components
//!
//! - `timing` - request id, elapsed time, request metrics
//! - `body_validation` - write methods must carry JSON
//! - `auth` - bearer token verification and identity substitution
//! - `access_log` - sanitized request record
//! - `body_transform` - request keys to snake_case
//! - `dispatch` - terminal hand-off to the proxy transport

pub mod access_log;
pub mod auth;
pub mod body_transform;
pub mod body_validation;
pub mod dispatch;
pub mod timing;

pub use access_log::AccessLogging;
pub use auth::Authentication;
pub use body_transform::RequestBodyTransform;
pub use body_validation::BodyValidation;
pub use dispatch::Dispatch;
pub use timing::Timing;

use crate::context::GatewayContext;
use crate::errors::GatewayError;
use crate::services::identity::IdentityAttributes;
use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use axum::http::{Method, Request};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// Per-request state, owned by the request's own task.
#[derive(Debug)]
pub struct PipelineContext {
    pub request_id: Uuid,
    pub started_at: Instant,
    pub parts: Parts,
    /// Buffered request body as it will be sent upstream.
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
    /// Set by authentication once the caller's identity is resolved.
    pub identity: Option<IdentityAttributes>,
}

impl PipelineContext {
    pub fn new(parts: Parts, body: Bytes) -> Self {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            request_id: Uuid::new_v4(),
            started_at: Instant::now(),
            parts,
            body,
            remote_addr,
            identity: None,
        }
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }
}

/// One step of the pipeline.
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        ctx: &mut PipelineContext,
        next: Next<'_>,
    ) -> Result<Response, GatewayError>;
}

/// The stages after the current one.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
}

impl<'a> Next<'a> {
    /// Run the remaining stages.
    ///
    /// Running past the end means no terminal stage was configured.
    pub async fn run(self, ctx: &mut PipelineContext) -> Result<Response, GatewayError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                tracing::trace!(target: "gateway.pipeline", stage = stage.name(), "Entering stage");
                stage.handle(ctx, Next { stages: rest }).await
            }
            None => Err(GatewayError::Internal(
                "pipeline ended without a terminal stage".to_string(),
            )),
        }
    }
}

/// Ordered, immutable stage list.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    max_body_bytes: usize,
    /// Upper bound on the stage chain, upstream round trip included.
    deadline: Option<Duration>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>, max_body_bytes: usize) -> Self {
        Self {
            stages,
            max_body_bytes,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Timing, BodyValidation, Authentication, AccessLogging,
    /// RequestBodyTransform, Dispatch.
    pub fn standard(context: &GatewayContext) -> Self {
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(Timing),
            Arc::new(BodyValidation),
            Arc::new(Authentication::new(
                context.verifier.clone(),
                Arc::clone(&context.identity),
            )),
            Arc::new(AccessLogging),
            Arc::new(RequestBodyTransform),
            Arc::new(Dispatch::new(Arc::clone(&context.proxy))),
        ];

        Self::new(stages, context.config.max_body_bytes).with_deadline(Duration::from_secs(
            context.config.request_timeout_seconds,
        ))
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Buffer the request body and run every stage.
    ///
    /// A terminating stage's error becomes the JSON error envelope. Requests
    /// that end outside the `Timing` stage (oversized body, expired deadline)
    /// are still logged and counted.
    pub async fn run(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();

        let mut ctx = PipelineContext::new(parts, Bytes::new());
        let span = tracing::info_span!(
            "request",
            request_id = %ctx.request_id,
            method = %ctx.parts.method,
            path = %ctx.parts.uri.path(),
        );

        self.execute(&mut ctx, body).instrument(span).await
    }

    async fn execute(&self, ctx: &mut PipelineContext, body: Body) -> Response {
        ctx.body = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(e) => {
                let error = GatewayError::PayloadTooLarge(format!("reading request body: {}", e));
                timing::record_finished(ctx, error.status_code());
                return error.into_response();
            }
        };

        let chain = Next {
            stages: &self.stages,
        }
        .run(ctx);

        // Dropping the chain on expiry also drops any in-flight upstream call.
        let outcome = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, chain).await,
            None => Ok(chain.await),
        };

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => e.into_response(),
            Err(_) => {
                let error = GatewayError::Timeout(format!(
                    "deadline of {:?} elapsed",
                    self.deadline.unwrap_or_default()
                ));
                timing::record_finished(ctx, error.status_code());
                error.into_response()
            }
        }
    }
}

/// Request methods whose body must be JSON.
pub fn is_write_method(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}
