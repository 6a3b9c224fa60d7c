//! Error types for the registry and the HTTP boundary

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::any::Any;
use thiserror::Error;

/// Errors raised while fetching or parsing a spec document.
///
/// These never escape `SpecRegistry::load_specs`; each one degrades the
/// affected document to a local file or to absent.
#[derive(Debug, Error)]
pub enum SpecError {
    /// Network failure or non-2xx response
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Body was not valid JSON
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Local file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A refresh produced no documents at all
    #[error("No spec documents could be loaded from remote or local sources")]
    NothingLoaded,
}

/// Errors surfaced at the HTTP boundary. Always rendered as JSON.
#[derive(Debug, Error)]
pub enum MockError {
    #[error("Missing or malformed Authorization header")]
    Unauthorized,

    #[error("No mock route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Event emission failed: {0}")]
    Emit(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MockError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Emit(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Unauthorized => json!({
                "error": "Unauthorized",
                "message": self.to_string(),
                "hint": "Send an 'Authorization: Bearer <token>' header; any non-empty token is accepted by the mock server",
            }),
            Self::RouteNotFound { .. } => json!({
                "error": "Not Found",
                "message": self.to_string(),
            }),
            _ => json!({
                "error": true,
                "status": status.as_u16(),
                "message": self.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string())
}
