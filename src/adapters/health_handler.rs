use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::adapters::mock_server::MockServer;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub openapi: String,
    pub asyncapi: String,
    pub routes: usize,
}

pub struct HealthHandler {
    server: Arc<MockServer>,
    start_time: std::time::Instant,
}

fn loaded(present: bool) -> String {
    let state = if present { "loaded" } else { "missing" };
    state.to_string()
}

impl HealthHandler {
    pub fn new(server: Arc<MockServer>) -> Self {
        Self {
            server,
            start_time: std::time::Instant::now(),
        }
    }

    /// Basic health check - returns 200 if server is running
    pub async fn health(&self) -> impl IntoResponse {
        let state = self.server.current().await;
        let status = HealthStatus {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            checks: HealthChecks {
                openapi: loaded(state.specs.open_api.is_some()),
                asyncapi: loaded(state.specs.async_api.is_some()),
                routes: state.routes.len(),
            },
        };

        (StatusCode::OK, Json(status))
    }

    /// Readiness check - ready once an OpenAPI document is compiled
    pub async fn ready(&self) -> impl IntoResponse {
        let state = self.server.current().await;

        if state.specs.open_api.is_some() {
            (StatusCode::OK, Json(serde_json::json!({
                "status": "ready",
                "message": "Mock routes are being served"
            })))
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({
                "status": "not_ready",
                "message": "No OpenAPI document loaded"
            })))
        }
    }

    /// Liveness check - returns 200 if server is alive
    pub async fn live(&self) -> impl IntoResponse {
        (StatusCode::OK, Json(serde_json::json!({
            "status": "alive",
            "message": "Server is alive"
        })))
    }
}
