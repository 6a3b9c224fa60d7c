use super::schema_synth::{generate_from_schema, resolve_ref, MAX_DEPTH};
use serde_json::{json, Value};

fn generate(schema: Value) -> Value {
    generate_from_schema(&schema, &json!({}), None, 0)
}

#[test]
fn test_object_with_properties() {
    let value = generate(json!({
        "type": "object",
        "properties": {
            "id": { "type": "integer" },
            "active": { "type": "boolean" },
            "tags": { "type": "array", "items": { "type": "string" } }
        }
    }));

    let obj = value.as_object().unwrap();
    assert!(obj["id"].is_i64());
    assert!(obj["active"].is_boolean());
    assert!(obj["tags"].is_array());
}

#[test]
fn test_properties_imply_object() {
    let value = generate(json!({ "properties": { "name": { "type": "string" } } }));
    assert!(value["name"].is_string());
}

#[test]
fn test_array_respects_item_bounds() {
    let schema = json!({ "type": "array", "minItems": 2, "maxItems": 4, "items": { "type": "integer" } });
    for _ in 0..50 {
        let value = generate(schema.clone());
        let items = value.as_array().unwrap();
        assert!(items.len() >= 2 && items.len() <= 4, "got {} items", items.len());
        assert!(items.iter().all(Value::is_i64));
    }
}

#[test]
fn test_array_defaults_to_one_through_five_strings() {
    for _ in 0..50 {
        let value = generate(json!({ "type": "array" }));
        let items = value.as_array().unwrap();
        assert!(!items.is_empty() && items.len() <= 5);
        assert!(items.iter().all(Value::is_string));
    }
}

#[test]
fn test_min_items_above_default_max() {
    let value = generate(json!({ "type": "array", "minItems": 8, "items": { "type": "boolean" } }));
    assert_eq!(value.as_array().unwrap().len(), 8);
}

#[test]
fn test_integer_bounds() {
    let schema = json!({ "type": "integer", "minimum": 5, "maximum": 9 });
    for _ in 0..100 {
        let n = generate(schema.clone()).as_i64().unwrap();
        assert!((5..=9).contains(&n));
    }
}

#[test]
fn test_integer_exclusive_bounds_both_styles() {
    let openapi_30 = json!({
        "type": "integer", "minimum": 1, "maximum": 3,
        "exclusiveMinimum": true, "exclusiveMaximum": true
    });
    let openapi_31 = json!({ "type": "integer", "exclusiveMinimum": 1, "exclusiveMaximum": 3 });
    for _ in 0..20 {
        assert_eq!(generate(openapi_30.clone()), json!(2));
        assert_eq!(generate(openapi_31.clone()), json!(2));
    }
}

#[test]
fn test_number_bounds() {
    let schema = json!({ "type": "number", "minimum": 0.5, "maximum": 1.5 });
    for _ in 0..100 {
        let n = generate(schema.clone()).as_f64().unwrap();
        assert!((0.5..=1.5).contains(&n));
    }
}

#[test]
fn test_number_full_double_domain() {
    let schema = json!({
        "type": "number",
        "format": "double",
        "minimum": -1.7976931348623157e308,
        "maximum": 1.7976931348623157e308
    });
    for _ in 0..50 {
        let n = generate(schema.clone()).as_f64().unwrap();
        assert!(n.is_finite());
        assert!(n.abs() <= 1e12);
    }
}

#[test]
fn test_integer_extreme_exclusive_bounds() {
    let schema = json!({
        "type": "integer",
        "exclusiveMinimum": -1.7976931348623157e308,
        "exclusiveMaximum": 1.7976931348623157e308
    });
    for _ in 0..20 {
        assert!(generate(schema.clone()).is_i64());
    }
}

#[test]
fn test_enum_always_member() {
    let schema = json!({ "type": "string", "enum": ["draft", "published", "archived"] });
    let allowed = schema["enum"].as_array().unwrap().clone();
    for _ in 0..100 {
        assert!(allowed.contains(&generate(schema.clone())));
    }
}

#[test]
fn test_example_then_default_precedence() {
    assert_eq!(
        generate(json!({ "type": "string", "example": "from-example", "default": "from-default" })),
        json!("from-example")
    );
    assert_eq!(
        generate(json!({ "type": "integer", "default": 7 })),
        json!(7)
    );
    assert_eq!(
        generate(json!({ "type": "string", "enum": ["only"], "example": "ignored" })),
        json!("only")
    );
}

#[test]
fn test_ref_resolution() {
    let spec = json!({
        "components": {
            "schemas": {
                "Pet": {
                    "type": "object",
                    "properties": { "species": { "type": "string", "enum": ["cat"] } }
                }
            }
        }
    });
    let value = generate_from_schema(&json!({ "$ref": "#/components/schemas/Pet" }), &spec, None, 0);
    assert_eq!(value, json!({ "species": "cat" }));
}

#[test]
fn test_unresolved_ref_is_null() {
    let value = generate(json!({ "$ref": "#/components/schemas/Missing" }));
    assert!(value.is_null());
    assert!(generate(json!({ "$ref": "other.json#/Pet" })).is_null());
}

#[test]
fn test_self_referential_ref_terminates() {
    let spec = json!({
        "components": { "schemas": { "Loop": { "$ref": "#/components/schemas/Loop" } } }
    });
    let value = generate_from_schema(&json!({ "$ref": "#/components/schemas/Loop" }), &spec, None, 0);
    assert!(value.is_null());
}

#[test]
fn test_recursive_tree_terminates() {
    let spec = json!({
        "components": {
            "schemas": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "label": { "type": "string" },
                        "children": {
                            "type": "array",
                            "minItems": 1,
                            "maxItems": 1,
                            "items": { "$ref": "#/components/schemas/Node" }
                        }
                    }
                }
            }
        }
    });
    let value = generate_from_schema(&json!({ "$ref": "#/components/schemas/Node" }), &spec, None, 0);
    assert!(value.is_object());

    // Walk down until the depth guard cuts the chain off
    let mut current = &value;
    let mut levels = 0;
    while let Some(child) = current.get("children").and_then(|c| c.get(0)) {
        current = child;
        levels += 1;
    }
    assert!(levels <= MAX_DEPTH);
}

#[test]
fn test_over_depth_is_null() {
    let value = generate_from_schema(&json!({ "type": "string" }), &json!({}), None, MAX_DEPTH + 1);
    assert!(value.is_null());
}

#[test]
fn test_all_of_merges_later_wins() {
    let value = generate(json!({
        "allOf": [
            { "type": "object", "properties": { "a": { "enum": [1] }, "b": { "enum": [1] } } },
            { "type": "object", "properties": { "b": { "enum": [2] } } }
        ],
        "properties": { "c": { "enum": [3] } }
    }));
    assert_eq!(value, json!({ "a": 1, "b": 2, "c": 3 }));
}

#[test]
fn test_one_of_and_any_of_take_first_branch() {
    for _ in 0..20 {
        assert_eq!(
            generate(json!({ "oneOf": [{ "enum": ["first"] }, { "enum": ["second"] }] })),
            json!("first")
        );
        assert_eq!(
            generate(json!({ "anyOf": [{ "type": "integer", "enum": [1] }, { "type": "string" }] })),
            json!(1)
        );
    }
}

#[test]
fn test_additional_properties_only() {
    for _ in 0..20 {
        let value = generate(json!({ "type": "object", "additionalProperties": { "type": "integer" } }));
        let obj = value.as_object().unwrap();
        assert!(!obj.is_empty() && obj.len() <= 3);
        assert!(obj.values().all(Value::is_i64));
    }
}

#[test]
fn test_string_formats() {
    let uuid = generate(json!({ "type": "string", "format": "uuid" }));
    assert!(uuid::Uuid::parse_str(uuid.as_str().unwrap()).is_ok());

    let email = generate(json!({ "type": "string", "format": "email" }));
    assert!(email.as_str().unwrap().contains('@'));

    let ip = generate(json!({ "type": "string", "format": "ipv4" }));
    assert!(ip.as_str().unwrap().parse::<std::net::Ipv4Addr>().is_ok());

    let ip6 = generate(json!({ "type": "string", "format": "ipv6" }));
    assert!(ip6.as_str().unwrap().parse::<std::net::Ipv6Addr>().is_ok());

    let date = generate(json!({ "type": "string", "format": "date" }));
    assert!(chrono::NaiveDate::parse_from_str(date.as_str().unwrap(), "%Y-%m-%d").is_ok());

    let date_time = generate(json!({ "type": "string", "format": "date-time" }));
    assert!(chrono::DateTime::parse_from_rfc3339(date_time.as_str().unwrap()).is_ok());

    let color = generate(json!({ "type": "string", "format": "color" }));
    let color = color.as_str().unwrap();
    assert!(color.starts_with('#') && color.len() == 7);

    let uri = generate(json!({ "type": "string", "format": "uri" }));
    assert!(uri.as_str().unwrap().starts_with("https://"));
}

#[test]
fn test_property_name_heuristics() {
    let schema = json!({ "type": "string" });
    let email = generate_from_schema(&schema, &json!({}), Some("contactEmail"), 0);
    assert!(email.as_str().unwrap().contains('@'));

    let avatar = generate_from_schema(&schema, &json!({}), Some("avatarUrl"), 0);
    assert!(avatar.as_str().unwrap().starts_with("https://"));

    let id = generate_from_schema(&schema, &json!({}), Some("id"), 0);
    assert!(uuid::Uuid::parse_str(id.as_str().unwrap()).is_ok());
}

#[test]
fn test_string_length_bounds() {
    for _ in 0..50 {
        let short = generate(json!({ "type": "string", "maxLength": 5 }));
        assert!(short.as_str().unwrap().chars().count() <= 5);

        let long = generate(json!({ "type": "string", "minLength": 40 }));
        assert!(long.as_str().unwrap().chars().count() >= 40);
    }
}

#[test]
fn test_pattern_drives_string() {
    let value = generate(json!({ "type": "string", "pattern": "^ORD-[0-9]{6}$" }));
    let s = value.as_str().unwrap();
    assert!(s.starts_with("ORD-"));
    assert_eq!(s.len(), 10);
}

#[test]
fn test_nullable_type_list() {
    let value = generate(json!({ "type": ["integer", "null"], "minimum": 1, "maximum": 1 }));
    assert_eq!(value, json!(1));
}

#[test]
fn test_malformed_input_degrades() {
    assert!(generate(json!("not a schema")).is_null());
    assert!(generate(json!({ "type": 42 })).is_string());
    assert!(generate(json!({ "allOf": "nope" })).is_string());
}

#[test]
fn test_resolve_ref_pointer() {
    let spec = json!({ "a": { "b/c": { "d": 1 } } });
    assert_eq!(resolve_ref(&spec, "#/a/b~1c/d"), Some(&json!(1)));
    assert_eq!(resolve_ref(&spec, "#/a/missing"), None);
    assert_eq!(resolve_ref(&spec, "#"), Some(&spec));
}
