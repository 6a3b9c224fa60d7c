use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, warn};

use crate::adapters::mock_server::{presence, MockServer};
use crate::adapters::route_table::MockRequest;
use crate::domain::SpecKind;

pub type SharedMockServer = Arc<MockServer>;

/// Catch-all for every mocked operation under the API prefix.
pub async fn mock_api(
    State(server): State<SharedMockServer>,
    method: Method,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = MockRequest {
        method,
        path: format!("/{}", path.trim_start_matches('/')),
        headers,
        query,
        body: parse_body(&body),
    };
    server.dispatch(request).await
}

/// The prefix itself (`/api` or `/api/`), served as the `/` operation.
pub async fn mock_api_root(
    State(server): State<SharedMockServer>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = MockRequest {
        method,
        path: "/".to_string(),
        headers,
        query,
        body: parse_body(&body),
    };
    server.dispatch(request).await
}

fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

pub async fn status(State(server): State<SharedMockServer>) -> Json<Value> {
    Json(server.status().await)
}

pub async fn refresh(State(server): State<SharedMockServer>) -> Response {
    match server.refresh().await {
        Ok(state) => {
            info!("Specs refreshed on request");
            Json(json!({
                "success": true,
                "specs": presence(&state.specs),
            }))
            .into_response()
        }
        Err(e) => {
            error!("Spec refresh failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn info() -> Json<Value> {
    Json(json!({
        "name": "mirage",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Schema-driven mock API generated from OpenAPI and AsyncAPI documents",
        "features": {
            "schemaSynthesis": true,
            "authGate": "bearer-format",
            "delays": true,
            "errorSimulation": true,
            "scenarios": true,
            "socketTriggers": true,
            "eventStream": true,
        },
        "extensions": {
            "x-mock": ["delay", "errorRate", "scenarios"],
            "x-triggered-by": ["operation", "event", "channel", "delay", "condition", "payload"],
        },
        "endpoints": {
            "status": "GET /_mock/status",
            "refresh": "POST /_mock/refresh",
            "info": "GET /_mock/info",
            "specs": "GET /_mock/specs/{openapi|asyncapi|webhooks}",
            "events": "GET /_mock/events?channel=<name>",
        },
    }))
}

pub async fn spec_document(State(server): State<SharedMockServer>, Path(kind): Path<String>) -> Response {
    let Some(kind) = SpecKind::parse(&kind) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Not Found", "message": format!("Unknown spec '{}'", kind) })),
        )
            .into_response();
    };

    let state = server.current().await;
    match state.specs.get(kind) {
        Some(doc) => Json(doc.as_ref().clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Not Found", "message": format!("No {} document loaded", kind) })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub channel: Option<String>,
}

/// Server-sent stream of emitted events, optionally filtered by channel.
pub async fn events(
    State(server): State<SharedMockServer>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let channel = query.channel;
    let stream = BroadcastStream::new(server.emitter().subscribe()).filter_map(move |item| {
        let channel = channel.clone();
        async move {
            let emitted = match item {
                Ok(emitted) => emitted,
                Err(e) => {
                    warn!("Event stream subscriber lagged: {}", e);
                    return None;
                }
            };
            if channel.as_deref().is_some_and(|c| c != emitted.channel) {
                return None;
            }
            let data = serde_json::to_string(&emitted).ok()?;
            Some(Ok::<_, Infallible>(Event::default().event(emitted.event).data(data)))
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
