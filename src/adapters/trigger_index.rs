//! AsyncAPI `x-triggered-by` correlation.
//!
//! Messages in an AsyncAPI document can declare which REST operations cause
//! them to be emitted:
//!
//! ```json
//! "x-triggered-by": {
//!   "operation": "POST /events/{eventId}/checkin",
//!   "channel": "events/{eventId}",
//!   "condition": "response.status == 201",
//!   "delay": 250,
//!   "payload": { "eventId": "{{request.params.eventId}}", "at": "{{now}}" }
//! }
//! ```
//!
//! [`TriggerIndex::parse`] collects these into rules keyed by operation and
//! [`trigger_socket_events`] evaluates them against a finished exchange.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::schema_synth::resolve_ref;
use crate::domain::{operation_key, EmittedEvent, EventEmitter, TriggerRule};

const TRIGGER_EXTENSION: &str = "x-triggered-by";
const MAX_REF_HOPS: usize = 8;

/// Rules grouped by operation key, in discovery order within each key.
#[derive(Debug, Clone, Default)]
pub struct TriggerIndex {
    rules: BTreeMap<String, Vec<TriggerRule>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerStats {
    pub total: usize,
    pub operations: Vec<OperationTriggers>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationTriggers {
    pub operation: String,
    pub events: Vec<String>,
}

/// What happened to the rules of one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerOutcome {
    pub emitted: usize,
    pub scheduled: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// A message found in the document, with what we know about where it lives.
struct FoundMessage<'a> {
    message: &'a Value,
    name_hint: String,
    channel: Option<String>,
}

impl TriggerIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the index from an AsyncAPI 2.x or 3.x document. Never fails;
    /// entries without an `operation` are skipped with a warning.
    pub fn parse(spec: &Value) -> Self {
        let mut index = Self::default();

        for found in collect_messages(spec) {
            let entries = match found.message.get(TRIGGER_EXTENSION) {
                Some(Value::Array(entries)) => entries.iter().collect::<Vec<_>>(),
                Some(entry @ Value::Object(_)) => vec![entry],
                Some(_) => {
                    warn!("Ignoring malformed {} on message '{}'", TRIGGER_EXTENSION, found.name_hint);
                    continue;
                }
                None => continue,
            };

            for entry in entries {
                match build_rule(&found, entry) {
                    Some(rule) => index.rules.entry(rule.operation_key.clone()).or_default().push(rule),
                    None => warn!(
                        "Skipping {} entry without an operation on message '{}'",
                        TRIGGER_EXTENSION, found.name_hint
                    ),
                }
            }
        }

        debug!("Parsed {} trigger rule(s) for {} operation(s)", index.len(), index.rules.len());
        index
    }

    pub fn rules_for(&self, operation_key: &str) -> &[TriggerRule] {
        self.rules.get(operation_key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn stats(&self) -> TriggerStats {
        TriggerStats {
            total: self.len(),
            operations: self
                .rules
                .iter()
                .map(|(operation, rules)| OperationTriggers {
                    operation: operation.clone(),
                    events: rules.iter().map(|r| r.event.clone()).collect(),
                })
                .collect(),
        }
    }
}

fn collect_messages(spec: &Value) -> Vec<FoundMessage<'_>> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();

    if let Some(channels) = spec.get("channels").and_then(Value::as_object) {
        for (name, channel) in channels {
            let address = channel
                .get("address")
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string();

            // 2.x: publish/subscribe operations carry the message
            for op in ["publish", "subscribe"] {
                if let Some(message) = channel.get(op).and_then(|o| o.get("message")) {
                    let id = format!("#/channels/{}/{}/message", name, op);
                    visit_message(spec, message, id, name.clone(), Some(address.clone()), &mut seen, &mut found, 0);
                }
            }

            // 3.x: messages live on the channel
            if let Some(messages) = channel.get("messages").and_then(Value::as_object) {
                for (message_name, message) in messages {
                    let id = format!("#/channels/{}/messages/{}", name, message_name);
                    visit_message(spec, message, id, message_name.clone(), Some(address.clone()), &mut seen, &mut found, 0);
                }
            }
        }
    }

    // 3.x: operations reference channel messages
    if let Some(operations) = spec.get("operations").and_then(Value::as_object) {
        for (name, operation) in operations {
            let address = operation.get("channel").and_then(|c| channel_address(spec, c));
            if let Some(messages) = operation.get("messages").and_then(Value::as_array) {
                for (i, message) in messages.iter().enumerate() {
                    let id = format!("#/operations/{}/messages/{}", name, i);
                    visit_message(spec, message, id, name.clone(), address.clone(), &mut seen, &mut found, 0);
                }
            }
        }
    }

    if let Some(messages) = spec
        .pointer("/components/messages")
        .and_then(Value::as_object)
    {
        for (name, message) in messages {
            let id = format!("#/components/messages/{}", name);
            visit_message(spec, message, id, name.clone(), None, &mut seen, &mut found, 0);
        }
    }

    found
}

fn channel_address(spec: &Value, channel: &Value) -> Option<String> {
    let reference = channel.get("$ref").and_then(Value::as_str)?;
    let resolved = resolve_ref(spec, reference)?;
    resolved
        .get("address")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| reference.rsplit('/').next().map(str::to_string))
}

#[allow(clippy::too_many_arguments)]
fn visit_message<'a>(
    spec: &'a Value,
    message: &'a Value,
    id: String,
    name_hint: String,
    channel: Option<String>,
    seen: &mut HashSet<String>,
    found: &mut Vec<FoundMessage<'a>>,
    hops: usize,
) {
    if hops > MAX_REF_HOPS {
        warn!("Giving up on message reference chain at {}", id);
        return;
    }

    if let Some(reference) = message.get("$ref").and_then(Value::as_str) {
        match resolve_ref(spec, reference) {
            Some(target) => {
                let hint = reference.rsplit('/').next().unwrap_or(&name_hint).to_string();
                visit_message(spec, target, reference.to_string(), hint, channel, seen, found, hops + 1);
            }
            None => warn!("Unresolvable message $ref '{}'", reference),
        }
        return;
    }

    if let Some(members) = message.get("oneOf").and_then(Value::as_array) {
        for (i, member) in members.iter().enumerate() {
            let member_id = format!("{}/oneOf/{}", id, i);
            visit_message(spec, member, member_id, name_hint.clone(), channel.clone(), seen, found, hops + 1);
        }
        return;
    }

    if seen.insert(id) {
        found.push(FoundMessage {
            message,
            name_hint,
            channel,
        });
    }
}

fn build_rule(found: &FoundMessage<'_>, entry: &Value) -> Option<TriggerRule> {
    let operation = entry.get("operation").and_then(Value::as_str)?.trim();
    let operation_key = match operation.split_once(char::is_whitespace) {
        Some((method, path)) => operation_key(method, path.trim()),
        None => return None,
    };

    let event = entry
        .get("event")
        .and_then(Value::as_str)
        .or_else(|| found.message.get("name").and_then(Value::as_str))
        .unwrap_or(&found.name_hint)
        .to_string();

    let channel_template = entry
        .get("channel")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| found.channel.clone())
        .unwrap_or_else(|| event.clone());

    let delay_ms = match entry.get("delay") {
        Some(Value::Number(n)) => n.as_f64().map(|d| d as i64).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };

    let payload_template = entry
        .get("payload")
        .cloned()
        .or_else(|| found.message.pointer("/examples/0/payload").cloned())
        .unwrap_or_else(|| json!("{{response.body}}"));

    Some(TriggerRule {
        operation_key,
        event,
        channel_template,
        delay_ms,
        condition: entry.get("condition").and_then(Value::as_str).map(str::to_string),
        payload_template,
    })
}

// ============================================================================
// Conditions: `<dotted.path> <op> <literal>`
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

const OPERATORS: [(&str, CompareOp); 6] = [
    (">=", CompareOp::Ge),
    ("<=", CompareOp::Le),
    ("==", CompareOp::Eq),
    ("!=", CompareOp::Ne),
    (">", CompareOp::Gt),
    ("<", CompareOp::Lt),
];

fn parse_condition(expr: &str) -> Option<(&str, CompareOp, Value)> {
    let (position, token, op) = expr.char_indices().find_map(|(i, _)| {
        OPERATORS
            .iter()
            .find(|(token, _)| expr[i..].starts_with(token))
            .map(|(token, op)| (i, *token, *op))
    })?;

    let path = expr[..position].trim();
    let literal = expr[position + token.len()..].trim();
    if path.is_empty() || literal.is_empty() || path.contains(char::is_whitespace) {
        return None;
    }

    Some((path, op, parse_literal(literal)))
}

fn parse_literal(raw: &str) -> Value {
    let quoted = (raw.starts_with('"') && raw.ends_with('"'))
        || (raw.starts_with('\'') && raw.ends_with('\''));
    if quoted && raw.len() >= 2 {
        return Value::String(raw[1..raw.len() - 1].to_string());
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
    }
}

/// Walk `a.b.0.c` through objects and arrays.
pub fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    let numbers = as_number(actual).zip(as_number(expected));
    match op {
        CompareOp::Eq | CompareOp::Ne => {
            let equal = match numbers {
                Some((a, b)) => a == b,
                None => string_form(actual) == string_form(expected),
            };
            (op == CompareOp::Eq) == equal
        }
        _ => match numbers {
            Some((a, b)) => match op {
                CompareOp::Gt => a > b,
                CompareOp::Lt => a < b,
                CompareOp::Ge => a >= b,
                CompareOp::Le => a <= b,
                CompareOp::Eq | CompareOp::Ne => false,
            },
            None => false,
        },
    }
}

/// Missing or unparseable conditions hold.
pub fn evaluate_condition(condition: Option<&str>, context: &Value) -> bool {
    let Some(expr) = condition.map(str::trim).filter(|c| !c.is_empty()) else {
        return true;
    };
    match parse_condition(expr) {
        Some((path, op, expected)) => {
            let actual = resolve_path(context, path).unwrap_or(&Value::Null);
            compare(actual, op, &expected)
        }
        None => {
            debug!("Unparseable trigger condition '{}', treating as true", expr);
            true
        }
    }
}

// ============================================================================
// Templating
// ============================================================================

/// Replace `{param}` with `request.params.param`; unknown params stay as-is.
pub fn render_channel(template: &str, context: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start + 1..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + 1 + len];
        out.push_str(&rest[..start]);
        match context.pointer(&format!("/request/params/{}", name)) {
            Some(value) if !name.is_empty() => out.push_str(&string_form(value)),
            _ => out.push_str(&rest[start..start + len + 2]),
        }
        rest = &rest[start + len + 2..];
    }

    out.push_str(rest);
    out
}

fn token_value(path: &str, context: &Value) -> Option<Value> {
    match path {
        "now" => Some(Value::String(chrono::Utc::now().to_rfc3339())),
        "timestamp" => Some(json!(chrono::Utc::now().timestamp_millis())),
        _ => resolve_path(context, path).cloned(),
    }
}

/// Substitute `{{path}}` tokens in a payload template.
///
/// A token that is an entire JSON string becomes the typed value; a token
/// inside a longer string becomes the value's text. When the result is not
/// valid JSON the template is returned untouched.
pub fn render_payload(template: &Value, context: &Value) -> Value {
    let Ok(text) = serde_json::to_string(template) else {
        return template.clone();
    };

    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + len;
        let path = rest[start + 2..end].trim();

        let opens_string = rest[..start].ends_with('"') && !rest[..start - 1].ends_with('\\');
        let whole = opens_string && rest[end + 2..].starts_with('"');

        if whole {
            out.push_str(&rest[..start - 1]);
            let typed = token_value(path, context).unwrap_or(Value::Null);
            out.push_str(&typed.to_string());
            rest = &rest[end + 3..];
        } else {
            out.push_str(&rest[..start]);
            if let Some(value) = token_value(path, context) {
                // Re-escape for embedding inside an existing JSON string
                let escaped = Value::String(string_form(&value)).to_string();
                out.push_str(&escaped[1..escaped.len() - 1]);
            }
            rest = &rest[end + 2..];
        }
    }
    out.push_str(rest);

    match serde_json::from_str(&out) {
        Ok(rendered) => rendered,
        Err(e) => {
            warn!("Payload template did not render to valid JSON ({}), sending it unrendered", e);
            template.clone()
        }
    }
}

// ============================================================================
// Emission
// ============================================================================

fn emit_isolated(emitter: &dyn EventEmitter, event: EmittedEvent) -> bool {
    let name = event.event.clone();
    match catch_unwind(AssertUnwindSafe(|| emitter.emit(event))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("Failed to emit '{}': {}", name, e);
            false
        }
        Err(_) => {
            warn!("Emitter panicked while emitting '{}'", name);
            false
        }
    }
}

/// Evaluate every rule registered for `operation_key` against `context`
/// (`{request:{method,path,params,query,body}, response:{status,body}}`).
///
/// Rules are handled in declaration order and independently: a false
/// condition or a failing emit never affects a sibling. Rules with a
/// positive delay are scheduled on the runtime and counted as `scheduled`.
pub fn trigger_socket_events(
    emitter: Arc<dyn EventEmitter>,
    index: &TriggerIndex,
    operation_key: &str,
    context: &Value,
) -> TriggerOutcome {
    let mut outcome = TriggerOutcome::default();

    for rule in index.rules_for(operation_key) {
        if !evaluate_condition(rule.condition.as_deref(), context) {
            debug!("Condition false for '{}' on {}", rule.event, operation_key);
            outcome.skipped += 1;
            continue;
        }

        let channel = render_channel(&rule.channel_template, context);
        let payload = render_payload(&rule.payload_template, context);

        if rule.delay_ms <= 0 {
            let event = EmittedEvent {
                channel,
                event: rule.event.clone(),
                payload,
                timestamp: chrono::Utc::now().to_rfc3339(),
            };
            if emit_isolated(emitter.as_ref(), event) {
                outcome.emitted += 1;
            } else {
                outcome.failed += 1;
            }
        } else {
            let emitter = Arc::clone(&emitter);
            let event_name = rule.event.clone();
            let delay = Duration::from_millis(rule.delay_ms as u64);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let event = EmittedEvent {
                    channel,
                    event: event_name,
                    payload,
                    timestamp: chrono::Utc::now().to_rfc3339(),
                };
                emit_isolated(emitter.as_ref(), event);
            });
            outcome.scheduled += 1;
        }
    }

    outcome
}
