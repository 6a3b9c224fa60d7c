//! # Mirage - Schema-driven mock API server
//!
//! Mirage turns an OpenAPI document into a working HTTP API that answers
//! with realistic fake data, and an AsyncAPI document into events emitted
//! after matching REST calls. No backend required.
//!
//! ## Features
//!
//! - **Schema synthesis**: `$ref`, `allOf`/`oneOf`/`anyOf`, formats, patterns and name heuristics
//! - **Simulation**: per-operation delays, error rates and weighted scenarios via `x-mock`
//! - **Auth gate**: bearer-format checks honoring `security: []`
//! - **Socket triggers**: `x-triggered-by` rules with conditions and payload templates
//! - **Spec cache**: remote-then-local loading with TTL and forced refresh
//! - **Metrics & health**: Prometheus metrics and Kubernetes-ready probes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mirage::adapters::{emitter::BroadcastEmitter, metrics_handler::MetricsCollector, mock_server::MockServer};
//! use mirage::config::Settings;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::new()?;
//!     let metrics = Arc::new(MetricsCollector::new()?);
//!     let server = Arc::new(MockServer::new(&settings, BroadcastEmitter::new(), metrics));
//!     server.initialize().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Domain**: spec kinds, route and trigger definitions, errors
//! - **Adapters**: synthesizer, route table, trigger index, registry, HTTP handlers
//! - **Config**: layered settings and the local spec watcher

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;

use crate::adapters::health_handler::HealthHandler;
use crate::adapters::metrics_handler::MetricsHandler;
use crate::adapters::mock_handler::{self, SharedMockServer};
use crate::domain::MockError;
use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method, Response, StatusCode, Uri},
    response::IntoResponse,
    routing::{any, get, post},
    Router,
};
use std::any::Any;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;

/// Creates the Axum application router with all endpoints configured.
///
/// # Arguments
///
/// * `server` - Mock server holding the compiled routes and triggers
/// * `health_handler` - Health check handler
/// * `metrics_handler` - Metrics collection handler
/// * `api_prefix` - Mount point for mocked operations, e.g. `/api`
///
/// # Returns
///
/// Configured Axum Router
pub fn create_app(
    server: SharedMockServer,
    health_handler: Arc<HealthHandler>,
    metrics_handler: Arc<MetricsHandler>,
    api_prefix: &str,
) -> Router {
    let public_router = Router::new()
        .route("/health", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.health().await }
            }
        }))
        .route("/health/ready", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.ready().await }
            }
        }))
        .route("/health/live", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.live().await }
            }
        }))
        .route("/metrics", get({
            let handler = metrics_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.metrics().await }
            }
        }));

    let mut mock_router = Router::new()
        .route("/_mock/status", get(mock_handler::status))
        .route("/_mock/refresh", post(mock_handler::refresh))
        .route("/_mock/info", get(mock_handler::info))
        .route("/_mock/specs/:kind", get(mock_handler::spec_document))
        .route("/_mock/events", get(mock_handler::events));

    if server.enabled() {
        let prefix = api_prefix.trim_end_matches('/');
        // `/*path` never matches an empty remainder, so the prefix root needs its own routes
        mock_router = mock_router
            .route(&format!("{}/*path", prefix), any(mock_handler::mock_api))
            .route(&format!("{}/", prefix), any(mock_handler::mock_api_root));
        if !prefix.is_empty() {
            mock_router = mock_router.route(prefix, any(mock_handler::mock_api_root));
        }
    } else {
        tracing::info!("Mock routes disabled by configuration");
    }

    public_router
        .merge(mock_router.with_state(server))
        .fallback(unmatched)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(
                    tower_http::cors::CorsLayer::new()
                        .allow_origin(tower_http::cors::Any)
                        .allow_methods(tower_http::cors::Any)
                        .allow_headers(tower_http::cors::Any),
                ),
        )
}

/// Anything outside the admin, health and mock routes.
async fn unmatched(method: Method, uri: Uri) -> axum::response::Response {
    MockError::RouteNotFound {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
    .into_response()
}

/// Turns a handler panic into the same JSON envelope as other 500s.
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<axum::body::Body> {
    tracing::error!("Handler panicked: {}", domain::panic_message(payload.as_ref()));

    let body = serde_json::json!({
        "error": true,
        "status": 500,
        "message": "Internal mock server error",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    let mut response = Response::new(axum::body::Body::from(body.to_string()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
