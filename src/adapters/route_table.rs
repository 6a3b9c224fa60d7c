//! Compiles an OpenAPI document into mock request handlers.
//!
//! Every `path x verb` becomes a [`RouteDefinition`]. A request runs through
//! the same pipeline for every operation: bearer gate, artificial delay,
//! simulated error roll, scenario selection, status and body resolution,
//! and finally trigger correlation. Per-operation behavior is tuned with the
//! `x-mock` extension:
//!
//! ```json
//! "x-mock": {
//!   "delay": 300,
//!   "errorRate": 0.1,
//!   "scenarios": {
//!     "notFound": { "weight": 1, "status": 404, "response": { "error": "gone" } },
//!     "ok": { "weight": 3 }
//!   }
//! }
//! ```

use axum::{
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Map, Value};
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info_span, warn, Instrument};

use crate::adapters::auth_middleware::BearerGate;
use crate::adapters::metrics_handler::MetricsCollector;
use crate::adapters::schema_synth::{generate_from_schema, resolve_ref};
use crate::adapters::trigger_index::{trigger_socket_events, TriggerIndex};
use crate::domain::auth::AuthRequirement;
use crate::domain::{operation_key, panic_message, EventEmitter, MockError, RouteDefinition};

const HTTP_METHODS: [&str; 8] = ["get", "put", "post", "delete", "options", "head", "patch", "trace"];
const SUCCESS_CODES: [&str; 4] = ["200", "201", "202", "204"];

/// Convert `/events/{eventId}/checkin` into `/events/:eventId/checkin`.
pub fn convert_path(openapi_path: &str) -> String {
    let mut out = String::with_capacity(openapi_path.len());
    let mut rest = openapi_path;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start + 1..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push(':');
        out.push_str(&rest[start + 1..start + 1 + len]);
        rest = &rest[start + len + 2..];
    }

    out.push_str(rest);
    out
}

/// Collaborators every compiled handler shares.
#[derive(Clone)]
pub struct RouteDeps {
    pub emitter: Arc<dyn EventEmitter>,
    pub triggers: Arc<TriggerIndex>,
    /// Applied when an operation has no `x-mock.delay`
    pub default_delay_ms: u64,
    pub metrics: Option<Arc<MetricsCollector>>,
}

/// A request as seen by the mock pipeline, independent of the HTTP host.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: Method,
    /// Path below the mount prefix, e.g. `/events/42`
    pub path: String,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DelaySpec {
    Fixed(u64),
    Range(u64, u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub weight: f64,
    pub status: Option<u16>,
    pub response: Option<Value>,
}

/// Parsed `x-mock` extension.
#[derive(Debug, Clone, Default)]
struct MockOptions {
    delay: Option<DelaySpec>,
    error_rate: f64,
    scenarios: Vec<Scenario>,
}

impl MockOptions {
    fn from_operation(operation: &Value) -> Self {
        let Some(ext) = operation.get("x-mock") else {
            return Self::default();
        };

        let delay = match ext.get("delay") {
            Some(Value::Number(n)) => n.as_f64().map(|d| DelaySpec::Fixed(d.max(0.0) as u64)),
            Some(Value::Object(range)) => {
                let min = range.get("min").and_then(Value::as_u64).unwrap_or(0);
                let max = range.get("max").and_then(Value::as_u64).unwrap_or(min);
                Some(DelaySpec::Range(min.min(max), min.max(max)))
            }
            _ => None,
        };

        let error_rate = ext
            .get("errorRate")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        Self {
            delay,
            error_rate,
            scenarios: parse_scenarios(ext.get("scenarios")),
        }
    }

    fn delay_ms(&self, default_delay_ms: u64) -> u64 {
        match self.delay {
            Some(DelaySpec::Fixed(ms)) => ms,
            Some(DelaySpec::Range(min, max)) if max > min => rand::thread_rng().gen_range(min..=max),
            Some(DelaySpec::Range(min, _)) => min,
            None => default_delay_ms,
        }
    }
}

fn parse_scenario(name: String, raw: &Value) -> Option<Scenario> {
    let obj = raw.as_object()?;
    Some(Scenario {
        name,
        weight: obj.get("weight").and_then(Value::as_f64).unwrap_or(1.0).max(0.0),
        status: obj
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok()),
        response: obj.get("response").cloned(),
    })
}

fn parse_scenarios(raw: Option<&Value>) -> Vec<Scenario> {
    match raw {
        Some(Value::Object(named)) => named
            .iter()
            .filter_map(|(name, s)| parse_scenario(name.clone(), s))
            .collect(),
        Some(Value::Array(list)) => list
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                let name = s
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("scenario{}", i + 1));
                parse_scenario(name, s)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Weighted draw. Zero weights never win unless every weight is zero, in
/// which case the draw is uniform.
pub fn select_scenario<'a, R: Rng + ?Sized>(scenarios: &'a [Scenario], rng: &mut R) -> Option<&'a Scenario> {
    if scenarios.is_empty() {
        return None;
    }

    let total: f64 = scenarios.iter().map(|s| s.weight).sum();
    if total <= 0.0 {
        return scenarios.get(rng.gen_range(0..scenarios.len()));
    }

    let mut roll = rng.gen_range(0.0..total);
    for scenario in scenarios {
        if scenario.weight <= 0.0 {
            continue;
        }
        if roll < scenario.weight {
            return Some(scenario);
        }
        roll -= scenario.weight;
    }
    scenarios.iter().rev().find(|s| s.weight > 0.0)
}

struct CompiledRoute {
    definition: RouteDefinition,
    segments: Vec<Segment>,
    auth: AuthRequirement,
    mock: MockOptions,
}

impl CompiledRoute {
    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    fn match_path(&self, path_segments: &[&str]) -> Option<HashMap<String, String>> {
        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, actual) in self.segments.iter().zip(path_segments) {
            match segment {
                Segment::Literal(expected) if expected == actual => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*actual).to_string());
                }
            }
        }
        Some(params)
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn compile_segments(express_path: &str) -> Vec<Segment> {
    split_path(express_path)
        .into_iter()
        .map(|s| match s.strip_prefix(':') {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(s.to_string()),
        })
        .collect()
}

/// Every `path x verb` with an operation object, in document order.
pub fn route_definitions(spec: &Value) -> Vec<RouteDefinition> {
    let Some(paths) = spec.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut definitions = Vec::new();
    for (path, item) in paths {
        for verb in HTTP_METHODS {
            let Some(operation) = item.get(verb).filter(|op| op.is_object()) else {
                continue;
            };
            let method = verb.to_ascii_uppercase();
            definitions.push(RouteDefinition {
                operation_key: operation_key(&method, path),
                path_template: convert_path(path),
                original_path: path.clone(),
                method,
                operation: operation.clone(),
            });
        }
    }
    definitions
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub method: String,
    pub path: String,
    #[serde(rename = "operationId")]
    pub operation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteStats {
    pub total: usize,
    #[serde(rename = "byMethod")]
    pub by_method: BTreeMap<String, usize>,
    pub paths: Vec<RouteSummary>,
}

pub fn get_route_stats(spec: &Value) -> RouteStats {
    let definitions = route_definitions(spec);
    let mut by_method = BTreeMap::new();
    for definition in &definitions {
        *by_method.entry(definition.method.clone()).or_insert(0) += 1;
    }

    RouteStats {
        total: definitions.len(),
        by_method,
        paths: definitions
            .iter()
            .map(|d| RouteSummary {
                method: d.method.clone(),
                path: d.path_template.clone(),
                operation_id: d.operation_id().map(str::to_string),
            })
            .collect(),
    }
}

/// The compiled handlers for one OpenAPI document. Rebuilt wholesale on
/// every spec refresh.
pub struct RouteTable {
    spec: Arc<Value>,
    routes: Vec<CompiledRoute>,
    deps: RouteDeps,
}

impl RouteTable {
    pub fn generate(spec: Arc<Value>, deps: RouteDeps) -> Self {
        let routes: Vec<CompiledRoute> = route_definitions(&spec)
            .into_iter()
            .map(|definition| CompiledRoute {
                segments: compile_segments(&definition.path_template),
                auth: AuthRequirement::for_operation(&definition.operation),
                mock: MockOptions::from_operation(&definition.operation),
                definition,
            })
            .collect();

        debug!("Compiled {} mock route(s)", routes.len());
        Self { spec, routes, deps }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Most specific route for `method path`; literal segments beat
    /// parameters, ties go to document order.
    fn find(&self, method: &Method, path: &str) -> Option<(&CompiledRoute, HashMap<String, String>)> {
        let segments = split_path(path);
        let mut best: Option<(&CompiledRoute, HashMap<String, String>)> = None;

        for route in self.routes.iter().filter(|r| r.definition.method == method.as_str()) {
            if let Some(params) = route.match_path(&segments) {
                let better = best
                    .as_ref()
                    .map_or(true, |(current, _)| route.literal_count() > current.literal_count());
                if better {
                    best = Some((route, params));
                }
            }
        }
        best
    }

    /// Run the full mock pipeline for one request.
    pub async fn dispatch(&self, request: MockRequest) -> Response {
        let started = Instant::now();
        let method = request.method.clone();

        let Some((route, params)) = self.find(&request.method, &request.path) else {
            let response = MockError::RouteNotFound {
                method: request.method.to_string(),
                path: request.path.clone(),
            }
            .into_response();
            self.record(&method, response.status(), started);
            return response;
        };

        let definition = &route.definition;
        let operation = definition.operation_id().unwrap_or(&definition.operation_key);
        let span = info_span!("mock_operation", operation = %operation);
        let response = match AssertUnwindSafe(self.handle(route, params, request))
            .catch_unwind()
            .instrument(span)
            .await
        {
            Ok(response) => response,
            Err(payload) => {
                error!(operation = %operation, "Handler panicked: {}", panic_message(payload.as_ref()));
                MockError::Internal("Internal mock server error".to_string()).into_response()
            }
        };
        self.record(&method, response.status(), started);
        response
    }

    fn record(&self, method: &Method, status: StatusCode, started: Instant) {
        if let Some(metrics) = &self.deps.metrics {
            metrics.record_request(method.as_str(), status.as_u16(), started.elapsed());
        }
    }

    async fn handle(
        &self,
        route: &CompiledRoute,
        params: HashMap<String, String>,
        request: MockRequest,
    ) -> Response {
        let definition = &route.definition;
        let op_label = definition.operation_id().unwrap_or(&definition.operation_key);

        let auth = match BearerGate::authenticate(&request.headers, route.auth) {
            Ok(auth) => auth,
            Err(e) => return e.into_response(),
        };

        let delay = route.mock.delay_ms(self.deps.default_delay_ms);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if route.mock.error_rate > 0.0 && rand::thread_rng().gen::<f64>() < route.mock.error_rate {
            warn!("Simulating failure for {}", op_label);
            if let Some(metrics) = &self.deps.metrics {
                metrics.simulated_errors.with_label_values(&[op_label]).inc();
            }
            return self.simulated_error(&definition.operation);
        }

        let scenario = select_scenario(&route.mock.scenarios, &mut rand::thread_rng()).cloned();
        let status = resolve_status(&definition.method, &definition.operation, scenario.as_ref());
        let body = self.resolve_body(&definition.operation, status, scenario.as_ref());

        debug!(
            operation = op_label,
            scenario = scenario.as_ref().map(|s| s.name.as_str()).unwrap_or("-"),
            status,
            authenticated = auth.authenticated,
            "Mock response"
        );

        let status_code = StatusCode::from_u16(status).unwrap_or_else(|_| {
            warn!("Invalid status {} for {}, using 500", status, op_label);
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let response = match &body {
            Some(body) => (status_code, Json(body.clone())).into_response(),
            None => status_code.into_response(),
        };

        if !self.deps.triggers.rules_for(&definition.operation_key).is_empty() {
            let context = json!({
                "request": {
                    "method": definition.method,
                    "path": request.path,
                    "params": params,
                    "query": request.query,
                    "body": request.body,
                    "auth": auth,
                },
                "response": {
                    "status": status,
                    "body": body.unwrap_or(Value::Null),
                },
            });
            let emitter = Arc::clone(&self.deps.emitter);
            let triggers = Arc::clone(&self.deps.triggers);
            let key = definition.operation_key.clone();
            let metrics = self.deps.metrics.clone();
            tokio::spawn(async move {
                let outcome = trigger_socket_events(emitter, &triggers, &key, &context);
                debug!(operation = %key, ?outcome, "Trigger correlation finished");
                if let Some(metrics) = metrics {
                    metrics.record_triggers(&key, &outcome);
                }
            });
        }

        response
    }

    fn simulated_error(&self, operation: &Value) -> Response {
        let synthesized = error_response(operation)
            .and_then(|resp| self.response_body(resp))
            .filter(|body| !body.is_null());

        let body = synthesized.unwrap_or_else(|| {
            json!({
                "error": true,
                "status": 500,
                "message": "Simulated server error",
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })
        });

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }

    fn resolve_body(&self, operation: &Value, status: u16, scenario: Option<&Scenario>) -> Option<Value> {
        if status == 204 {
            return None;
        }
        if let Some(literal) = scenario.and_then(|s| s.response.as_ref()) {
            return Some(literal.clone());
        }

        let synthesized = operation
            .get("responses")
            .and_then(|responses| find_response(responses, status))
            .and_then(|resp| self.response_body(resp));

        Some(synthesized.unwrap_or_else(|| json!({ "success": true })))
    }

    /// Body for a response object: synthesized from its schema, or its
    /// media-type example when there is no schema.
    fn response_body(&self, response: &Value) -> Option<Value> {
        let response = self.deref(response)?;
        let content = response.get("content").and_then(Value::as_object)?;

        let media = content
            .get("application/json")
            .filter(|m| m.get("schema").is_some())
            .or_else(|| content.values().find(|m| m.get("schema").is_some()));

        if let Some(schema) = media.and_then(|m| m.get("schema")) {
            return Some(generate_from_schema(schema, &self.spec, None, 0));
        }

        content.values().find_map(|m| m.get("example").cloned())
    }

    fn deref<'a>(&'a self, node: &'a Value) -> Option<&'a Value> {
        match node.get("$ref").and_then(Value::as_str) {
            Some(reference) => {
                let resolved = resolve_ref(&self.spec, reference);
                if resolved.is_none() {
                    warn!("Unresolvable response $ref '{}'", reference);
                }
                resolved
            }
            None => Some(node),
        }
    }
}

/// Scenario override, else the first documented success code, else the
/// verb's conventional default.
pub fn resolve_status(method: &str, operation: &Value, scenario: Option<&Scenario>) -> u16 {
    if let Some(status) = scenario.and_then(|s| s.status) {
        return status;
    }

    if let Some(responses) = operation.get("responses").and_then(Value::as_object) {
        if let Some(code) = SUCCESS_CODES.iter().find(|c| responses.contains_key(**c)) {
            if let Ok(status) = code.parse() {
                return status;
            }
        }
    }

    match method {
        "POST" => 201,
        "DELETE" => 204,
        _ => 200,
    }
}

/// Exact code, then `NXX`, then `default`.
fn find_response(responses: &Value, status: u16) -> Option<&Value> {
    let responses = responses.as_object()?;
    let exact = status.to_string();
    let class = format!("{}XX", status / 100);

    responses
        .get(&exact)
        .or_else(|| responses.get(&class))
        .or_else(|| responses.get(&class.to_ascii_lowercase()))
        .or_else(|| responses.get("default"))
}

/// `500`, then any other `5NN`, then `5XX`.
fn error_response(operation: &Value) -> Option<&Value> {
    let responses: &Map<String, Value> = operation.get("responses")?.as_object()?;
    responses
        .get("500")
        .or_else(|| {
            responses.iter().find_map(|(code, resp)| {
                let is_5nn = code.len() == 3 && code.starts_with('5') && code.chars().all(|c| c.is_ascii_digit());
                is_5nn.then_some(resp)
            })
        })
        .or_else(|| responses.get("5XX"))
        .or_else(|| responses.get("5xx"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_convert_path() {
        assert_eq!(convert_path("/events/{eventId}/checkin"), "/events/:eventId/checkin");
        assert_eq!(convert_path("/a/{x}/b/{y}"), "/a/:x/b/:y");
        assert_eq!(convert_path("/plain/path"), "/plain/path");
        assert_eq!(convert_path("/broken/{x"), "/broken/{x");
    }

    #[test]
    fn test_route_definitions_and_stats() {
        let spec = json!({
            "paths": {
                "/pets": {
                    "get": { "operationId": "listPets" },
                    "post": { "operationId": "createPet" },
                    "parameters": []
                },
                "/pets/{petId}": {
                    "get": { "operationId": "getPet" },
                    "delete": {}
                }
            }
        });

        let defs = route_definitions(&spec);
        assert_eq!(defs.len(), 4);
        assert!(defs.iter().any(|d| d.operation_key == "GET /pets/{petId}" && d.path_template == "/pets/:petId"));

        let stats = get_route_stats(&spec);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_method["GET"], 2);
        assert_eq!(stats.by_method["POST"], 1);
        assert_eq!(stats.by_method["DELETE"], 1);
        assert!(stats
            .paths
            .iter()
            .any(|p| p.operation_id.as_deref() == Some("createPet") && p.path == "/pets"));
    }

    #[test]
    fn test_resolve_status() {
        let scenario = Scenario {
            name: "missing".to_string(),
            weight: 1.0,
            status: Some(404),
            response: None,
        };
        let op = json!({ "responses": { "202": {}, "200": {} } });
        assert_eq!(resolve_status("GET", &op, Some(&scenario)), 404);
        assert_eq!(resolve_status("GET", &op, None), 200);
        assert_eq!(resolve_status("PUT", &json!({ "responses": { "202": {} } }), None), 202);
        assert_eq!(resolve_status("POST", &json!({}), None), 201);
        assert_eq!(resolve_status("DELETE", &json!({ "responses": { "404": {} } }), None), 204);
        assert_eq!(resolve_status("PATCH", &json!({}), None), 200);
    }

    #[test]
    fn test_find_response_fallbacks() {
        let responses = json!({ "2XX": { "description": "class" }, "default": { "description": "default" } });
        assert_eq!(find_response(&responses, 200).unwrap()["description"], "class");
        assert_eq!(find_response(&responses, 404).unwrap()["description"], "default");

        let exact = json!({ "201": { "description": "exact" }, "2XX": {} });
        assert_eq!(find_response(&exact, 201).unwrap()["description"], "exact");
    }

    #[test]
    fn test_error_response_lookup() {
        assert_eq!(
            error_response(&json!({ "responses": { "503": { "d": 1 }, "5XX": { "d": 2 } } })).unwrap()["d"],
            1
        );
        assert_eq!(error_response(&json!({ "responses": { "5XX": { "d": 2 } } })).unwrap()["d"], 2);
        assert!(error_response(&json!({ "responses": { "404": {} } })).is_none());
    }

    #[test]
    fn test_parse_scenarios_object_and_array() {
        let named = parse_scenarios(Some(&json!({
            "A": { "weight": 1, "status": 404 },
            "B": { "status": 200, "response": { "ok": true } }
        })));
        assert_eq!(named.len(), 2);
        let b = named.iter().find(|s| s.name == "B").unwrap();
        assert_eq!(b.weight, 1.0);
        assert_eq!(b.response, Some(json!({ "ok": true })));

        let listed = parse_scenarios(Some(&json!([{ "status": 500, "weight": 2 }, "junk"])));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "scenario1");
    }

    #[test]
    fn test_weighted_scenario_ratio() {
        let scenarios = parse_scenarios(Some(&json!({
            "A": { "weight": 1, "status": 404 },
            "B": { "weight": 3, "status": 200 }
        })));
        let mut rng = StdRng::seed_from_u64(7);

        let mut not_found = 0;
        let mut ok = 0;
        for _ in 0..10_000 {
            match select_scenario(&scenarios, &mut rng).and_then(|s| s.status) {
                Some(404) => not_found += 1,
                Some(200) => ok += 1,
                other => panic!("unexpected {:?}", other),
            }
        }

        let ratio = ok as f64 / not_found as f64;
        assert!((2.7..=3.3).contains(&ratio), "ratio was {}", ratio);
    }

    #[test]
    fn test_zero_weights() {
        let scenarios = parse_scenarios(Some(&json!([
            { "name": "never", "weight": 0, "status": 500 },
            { "name": "always", "weight": 2, "status": 200 }
        ])));
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(select_scenario(&scenarios, &mut rng).unwrap().name, "always");
        }

        let all_zero = parse_scenarios(Some(&json!([{ "weight": 0 }, { "weight": 0 }])));
        assert!(select_scenario(&all_zero, &mut rng).is_some());
        assert!(select_scenario(&[], &mut rng).is_none());
    }

    #[test]
    fn test_mock_options() {
        let opts = MockOptions::from_operation(&json!({ "x-mock": { "delay": 50, "errorRate": 3 } }));
        assert_eq!(opts.delay_ms(10), 50);
        assert_eq!(opts.error_rate, 1.0);

        let ranged = MockOptions::from_operation(&json!({ "x-mock": { "delay": { "min": 10, "max": 20 } } }));
        for _ in 0..20 {
            let d = ranged.delay_ms(0);
            assert!((10..=20).contains(&d));
        }

        assert_eq!(MockOptions::from_operation(&json!({})).delay_ms(75), 75);
    }
}
