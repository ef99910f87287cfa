//! HTTP routes for the gateway.
//!
//! Defines the Axum router and application state.

use crate::context::GatewayContext;
use crate::middleware::Pipeline;
use axum::{body::Body, extract::State, http::Request, response::Response, Router};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

/// Application state shared across all requests.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(context: &GatewayContext) -> Self {
        Self {
            pipeline: Arc::new(Pipeline::standard(context)),
        }
    }
}

/// Catch-all handler: every method and path goes through the pipeline.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.pipeline.run(request).await
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - a fallback that sends every request through the pipeline
/// - gzip compression when the caller accepts it
/// - TraceLayer for request logging
///
/// The request deadline is enforced inside the pipeline so an expired request
/// still gets the error envelope.
pub fn build_routes(state: AppState) -> Router {
    // Layer order (bottom-to-top execution):
    // 1. TraceLayer - log request details (outermost)
    // 2. CompressionLayer - compress rewritten responses
    Router::new()
        .fallback(gateway_handler)
        .with_state(state)
        .layer(CompressionLayer::new().gzip(true))
        .layer(TraceLayer::new_for_http())
}
