use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub mod auth;
pub mod error;

pub use error::{panic_message, MockError, SpecError};

/// The three documents the registry manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecKind {
    OpenApi,
    AsyncApi,
    Webhooks,
}

impl SpecKind {
    pub const ALL: [SpecKind; 3] = [SpecKind::OpenApi, SpecKind::AsyncApi, SpecKind::Webhooks];

    /// File name used for the local fallback under the project root.
    pub fn local_file(&self) -> &'static str {
        match self {
            SpecKind::OpenApi => "openapi.json",
            SpecKind::AsyncApi => "asyncapi.json",
            SpecKind::Webhooks => "webhooks.json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecKind::OpenApi => "openapi",
            SpecKind::AsyncApi => "asyncapi",
            SpecKind::Webhooks => "webhooks",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "openapi" => Some(SpecKind::OpenApi),
            "asyncapi" => Some(SpecKind::AsyncApi),
            "webhooks" => Some(SpecKind::Webhooks),
            _ => None,
        }
    }
}

impl fmt::Display for SpecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the join key shared by the route table and the trigger index,
/// e.g. `"POST /events/{eventId}/checkin"`.
pub fn operation_key(method: &str, original_path: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), original_path)
}

/// One OpenAPI path x verb, compiled for dispatch.
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    /// Upper-case HTTP verb
    pub method: String,
    /// Express-style template (`/events/:eventId`)
    pub path_template: String,
    /// Path exactly as written in the OpenAPI document
    pub original_path: String,
    pub operation_key: String,
    pub operation: Value,
}

impl RouteDefinition {
    pub fn operation_id(&self) -> Option<&str> {
        self.operation.get("operationId").and_then(Value::as_str)
    }
}

/// Declarative mapping from a completed REST operation to an emitted event.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerRule {
    pub operation_key: String,
    pub event: String,
    pub channel_template: String,
    pub delay_ms: i64,
    pub condition: Option<String>,
    pub payload_template: Value,
}

/// An event handed to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub channel: String,
    pub event: String,
    pub payload: Value,
    pub timestamp: String,
}

/// Opaque real-time transport. Implementations must not block.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: EmittedEvent) -> Result<(), MockError>;
}
