//! JSON-Schema driven fake data.
//!
//! [`generate_from_schema`] is total: malformed schemas, dangling `$ref`s
//! and cycles degrade to `null` or a partial object instead of failing.

use base64::Engine as _;
use chrono::{Duration, Utc};
use fake::faker::address::en::{CityName, CountryName, PostCode, StreetName};
use fake::faker::internet::en::{DomainSuffix, SafeEmail, Username};
use fake::faker::lorem::en::{Paragraph, Sentence, Word, Words};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Map, Value};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::warn;

use super::pattern;

/// Nodes deeper than this synthesize to `null`.
pub const MAX_DEPTH: usize = 10;

const DEFAULT_MIN_ITEMS: u64 = 1;
const DEFAULT_MAX_ITEMS: u64 = 5;
const DEFAULT_NUMBER_SPAN: f64 = 1000.0;
/// Draws never leave this magnitude when the declared span overflows `f64`.
const MAX_DRAW_MAGNITUDE: f64 = 1e12;

/// The shape of a schema node, decided once per node.
#[derive(Debug)]
enum SchemaShape<'a> {
    Ref(&'a str),
    AllOf(&'a [Value]),
    OneOf(&'a [Value]),
    AnyOf(&'a [Value]),
    Object {
        properties: Option<&'a Map<String, Value>>,
        additional: Option<&'a Value>,
    },
    Array(Option<&'a Value>),
    Primitive(Primitive),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    String,
    Integer,
    Number,
    Boolean,
    Null,
}

impl<'a> SchemaShape<'a> {
    fn classify(schema: &'a Map<String, Value>) -> Self {
        if let Some(pointer) = schema.get("$ref").and_then(Value::as_str) {
            return SchemaShape::Ref(pointer);
        }
        if let Some(members) = non_empty_array(schema, "allOf") {
            return SchemaShape::AllOf(members);
        }
        if let Some(members) = non_empty_array(schema, "oneOf") {
            return SchemaShape::OneOf(members);
        }
        if let Some(members) = non_empty_array(schema, "anyOf") {
            return SchemaShape::AnyOf(members);
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        let additional = schema
            .get("additionalProperties")
            .filter(|v| !matches!(v, Value::Bool(false)));

        match declared_type(schema) {
            Some("object") => SchemaShape::Object {
                properties,
                additional,
            },
            Some("array") => SchemaShape::Array(schema.get("items")),
            Some("integer") => SchemaShape::Primitive(Primitive::Integer),
            Some("number") => SchemaShape::Primitive(Primitive::Number),
            Some("boolean") => SchemaShape::Primitive(Primitive::Boolean),
            Some("null") => SchemaShape::Primitive(Primitive::Null),
            Some(_) => SchemaShape::Primitive(Primitive::String),
            None if properties.is_some() => SchemaShape::Object {
                properties,
                additional,
            },
            None if schema.contains_key("items") => SchemaShape::Array(schema.get("items")),
            None if additional.is_some() => SchemaShape::Object {
                properties: None,
                additional,
            },
            None => SchemaShape::Primitive(Primitive::String),
        }
    }
}

fn non_empty_array<'a>(schema: &'a Map<String, Value>, key: &str) -> Option<&'a [Value]> {
    schema
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .filter(|members| !members.is_empty())
}

/// `type` may be a string or, in OpenAPI 3.1, a list; `null` only wins when
/// it is the sole entry.
fn declared_type(schema: &Map<String, Value>) -> Option<&str> {
    match schema.get("type")? {
        Value::String(t) => Some(t.as_str()),
        Value::Array(types) => {
            let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
            names
                .iter()
                .copied()
                .find(|t| *t != "null")
                .or_else(|| names.first().copied())
        }
        _ => None,
    }
}

/// Resolve a local JSON pointer such as `#/components/schemas/Pet`.
/// External references are not followed.
pub fn resolve_ref<'a>(spec: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    spec.pointer(pointer)
}

/// Synthesize a value for `schema`.
///
/// `spec` is the whole document `$ref`s are resolved against and
/// `property_name` the key this value will be stored under, used for
/// name-based heuristics when the schema itself says little.
pub fn generate_from_schema(
    schema: &Value,
    spec: &Value,
    property_name: Option<&str>,
    depth: usize,
) -> Value {
    if depth > MAX_DEPTH {
        return Value::Null;
    }

    let node = match schema {
        Value::Object(node) => node,
        Value::Bool(true) => return generate_string(&Map::new(), property_name),
        _ => return Value::Null,
    };

    let shape = SchemaShape::classify(node);

    if let SchemaShape::Ref(reference) = shape {
        return match resolve_ref(spec, reference) {
            Some(target) => generate_from_schema(target, spec, property_name, depth + 1),
            None => {
                warn!("Unresolvable $ref '{}', generating null", reference);
                Value::Null
            }
        };
    }

    if let Some(literal) = literal_value(node) {
        return literal;
    }

    match shape {
        SchemaShape::Ref(_) => Value::Null,
        SchemaShape::AllOf(members) => merge_all_of(node, members, spec, property_name, depth),
        SchemaShape::OneOf(members) | SchemaShape::AnyOf(members) => {
            generate_from_schema(&members[0], spec, property_name, depth + 1)
        }
        SchemaShape::Object {
            properties,
            additional,
        } => generate_object(properties, additional, spec, depth),
        SchemaShape::Array(items) => generate_array(node, items, spec, property_name, depth),
        SchemaShape::Primitive(Primitive::String) => generate_string(node, property_name),
        SchemaShape::Primitive(Primitive::Integer) => generate_integer(node),
        SchemaShape::Primitive(Primitive::Number) => generate_number(node),
        SchemaShape::Primitive(Primitive::Boolean) => json!(rand::thread_rng().gen_bool(0.5)),
        SchemaShape::Primitive(Primitive::Null) => Value::Null,
    }
}

/// `enum` > `example` > `default`.
fn literal_value(node: &Map<String, Value>) -> Option<Value> {
    if let Some(choices) = node.get("enum").and_then(Value::as_array) {
        if let Some(choice) = choices.choose(&mut rand::thread_rng()) {
            return Some(choice.clone());
        }
    }
    if let Some(example) = node.get("example") {
        return Some(example.clone());
    }
    node.get("default").cloned()
}

fn merge_all_of(
    node: &Map<String, Value>,
    members: &[Value],
    spec: &Value,
    property_name: Option<&str>,
    depth: usize,
) -> Value {
    let mut merged = Map::new();
    let mut saw_object = false;
    let mut last_scalar = Value::Null;

    for member in members {
        match generate_from_schema(member, spec, property_name, depth + 1) {
            Value::Object(fields) => {
                saw_object = true;
                merged.extend(fields);
            }
            Value::Null => {}
            other => last_scalar = other,
        }
    }

    // Properties declared next to allOf extend the composed object
    if let Some(properties) = node.get("properties").and_then(Value::as_object) {
        if let Value::Object(fields) = generate_object(Some(properties), None, spec, depth) {
            saw_object = true;
            merged.extend(fields);
        }
    }

    if saw_object {
        Value::Object(merged)
    } else {
        last_scalar
    }
}

fn generate_object(
    properties: Option<&Map<String, Value>>,
    additional: Option<&Value>,
    spec: &Value,
    depth: usize,
) -> Value {
    let mut result = Map::new();

    if let Some(properties) = properties {
        for (name, prop_schema) in properties {
            let value = generate_from_schema(prop_schema, spec, Some(name), depth + 1);
            result.insert(name.clone(), value);
        }
        return Value::Object(result);
    }

    if let Some(additional) = additional {
        let value_schema = match additional {
            Value::Object(_) => additional.clone(),
            _ => json!({ "type": "string" }),
        };
        let count = rand::thread_rng().gen_range(1..=3);
        for i in 0..count {
            let mut key: String = Word().fake();
            if result.contains_key(&key) {
                key = format!("{}{}", key, i + 1);
            }
            let value = generate_from_schema(&value_schema, spec, Some(&key), depth + 1);
            result.insert(key, value);
        }
    }

    Value::Object(result)
}

fn generate_array(
    node: &Map<String, Value>,
    items: Option<&Value>,
    spec: &Value,
    property_name: Option<&str>,
    depth: usize,
) -> Value {
    let min_items = node.get("minItems").and_then(Value::as_u64);
    let max_items = node.get("maxItems").and_then(Value::as_u64);

    let mut lo = min_items.unwrap_or(DEFAULT_MIN_ITEMS);
    let mut hi = max_items.unwrap_or(DEFAULT_MAX_ITEMS);
    if hi < lo {
        if max_items.is_some() {
            lo = hi;
        } else {
            hi = lo;
        }
    }

    let count = rand::thread_rng().gen_range(lo..=hi);
    let default_items = json!({ "type": "string" });
    let item_schema = items.unwrap_or(&default_items);

    Value::Array(
        (0..count)
            .map(|_| generate_from_schema(item_schema, spec, property_name, depth + 1))
            .collect(),
    )
}

// ============================================================================
// Strings
// ============================================================================

fn generate_string(node: &Map<String, Value>, property_name: Option<&str>) -> Value {
    if let Some(format) = node.get("format").and_then(Value::as_str) {
        if let Some(value) = string_for_format(format) {
            return json!(value);
        }
    }

    if let Some(sampled) = node
        .get("pattern")
        .and_then(Value::as_str)
        .and_then(pattern::sample)
    {
        return json!(sampled);
    }

    let min_len = node.get("minLength").and_then(Value::as_u64).map(|n| n as usize);
    let max_len = node.get("maxLength").and_then(Value::as_u64).map(|n| n as usize);

    let text = property_name
        .and_then(string_for_property_name)
        .unwrap_or_else(|| filler_text(min_len, max_len));

    json!(fit_length(text, min_len, max_len))
}

fn string_for_format(format: &str) -> Option<String> {
    let mut rng = rand::thread_rng();
    let value: String = match format {
        "email" => SafeEmail().fake(),
        "uuid" => uuid::Uuid::new_v4().to_string(),
        "uri" | "url" => random_url(),
        "hostname" => random_hostname(),
        "ipv4" => Ipv4Addr::new(rng.gen_range(1..=223), rng.gen(), rng.gen(), rng.gen_range(1..=254))
            .to_string(),
        "ipv6" => Ipv6Addr::new(
            0x2001,
            0x0db8,
            rng.gen(),
            rng.gen(),
            rng.gen(),
            rng.gen(),
            rng.gen(),
            rng.gen(),
        )
        .to_string(),
        "date" => random_past_datetime().format("%Y-%m-%d").to_string(),
        "date-time" => random_past_datetime().to_rfc3339(),
        "time" => random_past_datetime().format("%H:%M:%S").to_string(),
        "password" => random_alphanumeric(rng.gen_range(12..=20)),
        "byte" => {
            let bytes: Vec<u8> = (0..rng.gen_range(8..=24)).map(|_| rng.gen()).collect();
            base64::engine::general_purpose::STANDARD.encode(bytes)
        }
        "binary" => (0..16).map(|_| format!("{:02x}", rng.gen::<u8>())).collect(),
        "phone" => PhoneNumber().fake(),
        "color" => random_color(),
        _ => return None,
    };
    Some(value)
}

/// Guess a realistic value from the property name alone.
fn string_for_property_name(name: &str) -> Option<String> {
    let lower = name.to_ascii_lowercase();
    let has = |needle: &str| lower.contains(needle);

    let value: String = if has("email") {
        SafeEmail().fake()
    } else if has("phone") || has("mobile") {
        PhoneNumber().fake()
    } else if has("token") {
        random_alphanumeric(32)
    } else if has("image") || has("avatar") || has("photo") {
        let seed: String = Word().fake();
        format!("https://picsum.photos/seed/{}/640/480", seed)
    } else if has("url") || has("website") || has("link") {
        random_url()
    } else if has("color") || has("colour") {
        random_color()
    } else if has("city") {
        CityName().fake()
    } else if has("country") {
        CountryName().fake()
    } else if has("zip") || has("postal") {
        PostCode().fake()
    } else if has("address") || has("street") {
        let street: String = StreetName().fake();
        format!("{} {}", rand::thread_rng().gen_range(1..=9999), street)
    } else if has("description") || has("bio") || has("summary") {
        Paragraph(1..3).fake()
    } else if has("title") {
        let sentence: String = Sentence(2..5).fake();
        sentence.trim_end_matches('.').to_string()
    } else if has("firstname") || has("first_name") {
        FirstName().fake()
    } else if has("lastname") || has("last_name") || has("surname") {
        LastName().fake()
    } else if has("username") || has("user_name") || has("login") {
        Username().fake()
    } else if has("name") {
        Name().fake()
    } else if lower == "id" || lower.ends_with("_id") || name.ends_with("Id") {
        uuid::Uuid::new_v4().to_string()
    } else {
        return None;
    };
    Some(value)
}

fn filler_text(min_len: Option<usize>, max_len: Option<usize>) -> String {
    match max_len {
        Some(max) if max <= 12 => Word().fake(),
        _ => {
            let words: Vec<String> = Words(2..6).fake();
            let mut text = words.join(" ");
            if let Some(min) = min_len {
                while text.chars().count() < min {
                    let word: String = Word().fake();
                    text.push(' ');
                    text.push_str(&word);
                }
            }
            text
        }
    }
}

fn fit_length(mut text: String, min_len: Option<usize>, max_len: Option<usize>) -> String {
    if let Some(max) = max_len {
        if text.chars().count() > max {
            text = text.chars().take(max).collect::<String>().trim_end().to_string();
        }
    }
    if let Some(min) = min_len {
        let current = text.chars().count();
        if current < min {
            let mut rng = rand::thread_rng();
            text.extend((current..min).map(|_| rng.gen_range(b'a'..=b'z') as char));
        }
    }
    text
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn random_hostname() -> String {
    let word: String = Word().fake();
    let suffix: String = DomainSuffix().fake();
    format!("{}.{}", word.to_ascii_lowercase(), suffix)
}

fn random_url() -> String {
    let path: String = Word().fake();
    format!("https://www.{}/{}", random_hostname(), path.to_ascii_lowercase())
}

fn random_color() -> String {
    format!("#{:06x}", rand::thread_rng().gen_range(0..=0xFF_FFFFu32))
}

fn random_past_datetime() -> chrono::DateTime<Utc> {
    let seconds = rand::thread_rng().gen_range(0..(2 * 365 * 24 * 3600));
    Utc::now() - Duration::seconds(seconds)
}

// ============================================================================
// Numbers
// ============================================================================

/// Lower bound and whether it is exclusive. Accepts the OpenAPI 3.0 boolean
/// form and the 3.1 numeric form of `exclusiveMinimum`.
fn lower_bound(node: &Map<String, Value>) -> Option<(f64, bool)> {
    bound(node, "minimum", "exclusiveMinimum", |a, b| a > b)
}

fn upper_bound(node: &Map<String, Value>) -> Option<(f64, bool)> {
    bound(node, "maximum", "exclusiveMaximum", |a, b| a < b)
}

fn bound(
    node: &Map<String, Value>,
    inclusive_key: &str,
    exclusive_key: &str,
    tighter: fn(f64, f64) -> bool,
) -> Option<(f64, bool)> {
    let inclusive = node.get(inclusive_key).and_then(Value::as_f64);
    match node.get(exclusive_key) {
        Some(Value::Bool(true)) => inclusive.map(|v| (v, true)),
        Some(Value::Number(n)) => {
            let exclusive = n.as_f64()?;
            match inclusive {
                Some(v) if tighter(v, exclusive) => Some((v, false)),
                _ => Some((exclusive, true)),
            }
        }
        _ => inclusive.map(|v| (v, false)),
    }
}

type Bound = Option<(f64, bool)>;

/// Bounds plus the concrete range to draw from when one side is open.
fn numeric_range(node: &Map<String, Value>) -> (Bound, Bound, f64, f64) {
    let lower = lower_bound(node);
    let upper = upper_bound(node);
    let lo = match (lower, upper) {
        (Some((v, _)), _) => v,
        (None, Some((hi, _))) if hi >= 0.0 => 0.0,
        (None, Some((hi, _))) => hi - DEFAULT_NUMBER_SPAN,
        (None, None) => 0.0,
    };
    let hi = match upper {
        Some((v, _)) => v,
        None => lo + DEFAULT_NUMBER_SPAN,
    };
    (lower, upper, lo, hi)
}

fn generate_integer(node: &Map<String, Value>) -> Value {
    let (lower, upper, lo, hi) = numeric_range(node);

    let lo = match lower {
        Some((_, true)) => (lo.floor() as i64).saturating_add(1),
        _ => lo.ceil() as i64,
    };
    let hi = match upper {
        Some((_, true)) => (hi.ceil() as i64).saturating_sub(1),
        _ => hi.floor() as i64,
    };

    if lo >= hi {
        return json!(lo);
    }
    json!(rand::thread_rng().gen_range(lo..=hi))
}

fn generate_number(node: &Map<String, Value>) -> Value {
    let (lower, upper, lo, hi) = numeric_range(node);
    let lo_exclusive = matches!(lower, Some((_, true)));
    let hi_exclusive = matches!(upper, Some((_, true)));

    if lo >= hi {
        return json!(lo);
    }

    let (draw_lo, draw_hi) = draw_window(lo, hi);
    let raw: f64 = rand::thread_rng().gen_range(draw_lo..draw_hi);
    let rounded = (raw * 100.0).round() / 100.0;

    let within = |v: f64| {
        let above = if lo_exclusive { v > lo } else { v >= lo };
        let below = if hi_exclusive { v < hi } else { v <= hi };
        above && below
    };

    if within(rounded) {
        json!(rounded)
    } else if within(raw) {
        json!(raw)
    } else {
        json!(draw_lo / 2.0 + draw_hi / 2.0)
    }
}

/// `gen_range` rejects ranges whose width is not finite, e.g. the full
/// `double` domain that code generators like to emit.
fn draw_window(lo: f64, hi: f64) -> (f64, f64) {
    if (hi - lo).is_finite() {
        (lo, hi)
    } else {
        (lo.max(-MAX_DRAW_MAGNITUDE), hi.min(MAX_DRAW_MAGNITUDE))
    }
}
