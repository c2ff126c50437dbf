//! JSON-Schema cleaning for vendor tool declarations.
//!
//! The strict Code Assist backends reject most JSON-Schema keywords, so
//! tool parameter schemas are rewritten into the subset they accept.
//! Information that cannot survive (constraints, union shapes) is folded
//! into `description` hints rather than discarded. The transformations are
//! shape-agnostic, so they operate on a generic ordered JSON tree.

use serde_json::{json, Map, Value};

/// Which cleaning profile to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanMode {
    /// Strict profile: full rewrite including placeholder properties for
    /// empty object schemas.
    Full,
    /// Lighter profile used by the Responses dialect: same keyword strips
    /// plus `nullable`/`title`, but no placeholders.
    Light,
}

/// Keywords the strict backends reject outright. Constraint-bearing ones
/// are folded into `description` before removal.
const STRIPPED: &[&str] = &["$schema", "additionalProperties", "title"];
const FOLDED: &[&str] = &["minLength", "maxLength", "pattern"];

/// Clean a tool parameter schema for the wire.
pub fn clean_schema(schema: &Value, mode: CleanMode) -> Value {
    clean_node(schema, mode, true)
}

fn clean_node(node: &Value, mode: CleanMode, top_level: bool) -> Value {
    let obj = match node {
        Value::Object(o) => o,
        Value::Array(items) => {
            return Value::Array(items.iter().map(|v| clean_node(v, mode, false)).collect());
        }
        other => return other.clone(),
    };

    // $ref collapses to an object stub; sibling keys do not survive.
    if let Some(reference) = obj.get("$ref").and_then(|v| v.as_str()) {
        let name = reference.rsplit('/').next().unwrap_or(reference);
        return json!({
            "type": "object",
            "description": format!("See: {}", name),
        });
    }

    let mut map = obj.clone();

    // anyOf: keep the branch with the richer shape (object over scalar)
    // and record what the schema would have accepted.
    if let Some(Value::Array(branches)) = map.remove("anyOf") {
        let types: Vec<String> = branches
            .iter()
            .map(|b| {
                b.get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("object")
                    .to_string()
            })
            .collect();
        let chosen = branches
            .iter()
            .find(|b| {
                b.get("type").and_then(|t| t.as_str()) == Some("object")
                    || b.get("properties").is_some()
            })
            .or_else(|| branches.first())
            .cloned()
            .unwrap_or_else(|| json!({ "type": "object" }));

        let mut cleaned = clean_node(&chosen, mode, top_level);
        if let Value::Object(ref mut m) = cleaned {
            append_description(m, &format!("Accepts: {}", types.join(", ")));
        }
        return cleaned;
    }

    merge_all_of(&mut map);
    convert_const(&mut map);
    flatten_type_array(&mut map);
    strip_unsupported(&mut map, mode);

    // Recurse into properties, tracking which ones declared themselves
    // nullable via a type array so they can be dropped from `required`.
    let mut nullable_props: Vec<String> = Vec::new();
    if let Some(Value::Object(props)) = map.get("properties").cloned() {
        let mut cleaned_props = Map::new();
        for (name, child) in props {
            if type_array_has_null(&child) {
                nullable_props.push(name.clone());
            }
            cleaned_props.insert(name, clean_node(&child, mode, false));
        }
        map.insert("properties".to_string(), Value::Object(cleaned_props));
    }
    if !nullable_props.is_empty() {
        if let Some(Value::Array(required)) = map.get("required").cloned() {
            let filtered: Vec<Value> = required
                .into_iter()
                .filter(|r| {
                    r.as_str()
                        .map_or(true, |s| !nullable_props.iter().any(|n| n == s))
                })
                .collect();
            map.insert("required".to_string(), Value::Array(filtered));
        }
    }

    if let Some(items) = map.get("items").cloned() {
        map.insert("items".to_string(), clean_node(&items, mode, false));
    }

    if !map.contains_key("type") && (map.contains_key("properties") || top_level) {
        map.insert("type".to_string(), json!("object"));
    }

    if mode == CleanMode::Full {
        add_placeholders(&mut map, top_level);
    }

    Value::Object(map)
}

/// Merge all allOf branches' properties/required into the parent object.
fn merge_all_of(map: &mut Map<String, Value>) {
    let branches = match map.remove("allOf") {
        Some(Value::Array(branches)) => branches,
        Some(other) => {
            map.insert("allOf".to_string(), other);
            return;
        }
        None => return,
    };

    let mut properties = map
        .get("properties")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    let mut required: Vec<Value> = map
        .get("required")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    for branch in &branches {
        if let Some(props) = branch.get("properties").and_then(|v| v.as_object()) {
            for (k, v) in props {
                properties.insert(k.clone(), v.clone());
            }
        }
        if let Some(reqs) = branch.get("required").and_then(|v| v.as_array()) {
            for r in reqs {
                if !required.contains(r) {
                    required.push(r.clone());
                }
            }
        }
    }

    map.insert("type".to_string(), json!("object"));
    if !properties.is_empty() {
        map.insert("properties".to_string(), Value::Object(properties));
    }
    if !required.is_empty() {
        map.insert("required".to_string(), Value::Array(required));
    }
}

/// `const: x` becomes a single-value enum with a forced string type.
fn convert_const(map: &mut Map<String, Value>) {
    if let Some(value) = map.remove("const") {
        map.insert("type".to_string(), json!("string"));
        map.insert("enum".to_string(), Value::Array(vec![value]));
    }
}

/// Flatten a `type` array to its first non-null entry, noting nullability
/// in the description.
fn flatten_type_array(map: &mut Map<String, Value>) {
    let types = match map.get("type") {
        Some(Value::Array(types)) => types.clone(),
        _ => return,
    };

    let had_null = types.iter().any(|t| t.as_str() == Some("null"));
    let first = types
        .iter()
        .find(|t| t.as_str() != Some("null"))
        .cloned()
        .unwrap_or_else(|| json!("string"));

    map.insert("type".to_string(), first);
    if had_null {
        append_description(map, "(nullable)");
    }
}

fn type_array_has_null(schema: &Value) -> bool {
    schema
        .get("type")
        .and_then(|t| t.as_array())
        .map_or(false, |types| {
            types.iter().any(|t| t.as_str() == Some("null"))
        })
}

/// Strip unsupported keywords, folding constraint values into the
/// description so their information survives.
fn strip_unsupported(map: &mut Map<String, Value>, mode: CleanMode) {
    for key in FOLDED {
        if let Some(value) = map.remove(*key) {
            let rendered = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            append_description(map, &format!("{}: {}", key, rendered));
        }
    }

    for key in STRIPPED {
        map.remove(*key);
    }
    if mode == CleanMode::Light {
        map.remove("nullable");
    }

    let extension_keys: Vec<String> = map
        .keys()
        .filter(|k| k.starts_with("x-"))
        .cloned()
        .collect();
    for key in extension_keys {
        map.remove(&key);
    }
}

/// Placeholder rules for the strict profile. An empty top-level object
/// schema gains a required `reason` property so the declaration stays
/// valid; nested objects with properties but no `required` list gain an
/// unused `_` entry instead.
fn add_placeholders(map: &mut Map<String, Value>, top_level: bool) {
    if map.get("type").and_then(|t| t.as_str()) != Some("object") {
        return;
    }

    let has_props = map
        .get("properties")
        .and_then(|p| p.as_object())
        .map_or(false, |p| !p.is_empty());

    if top_level && !has_props {
        map.insert(
            "properties".to_string(),
            json!({
                "reason": {
                    "type": "string",
                    "description": "Reason for this call",
                }
            }),
        );
        map.insert("required".to_string(), json!(["reason"]));
    } else if !top_level && has_props && !map.contains_key("required") {
        if let Some(Value::Object(props)) = map.get_mut("properties") {
            props.insert("_".to_string(), json!({ "type": "string" }));
        }
    }
}

fn append_description(map: &mut Map<String, Value>, hint: &str) {
    let combined = match map.get("description").and_then(|d| d.as_str()) {
        Some(existing) if !existing.is_empty() => format!("{} {}", existing, hint),
        _ => hint.to_string(),
    };
    map.insert("description".to_string(), Value::String(combined));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_becomes_single_value_enum() {
        let schema = json!({ "const": "x" });
        let cleaned = clean_schema(&schema, CleanMode::Full);

        assert_eq!(cleaned["type"], "string");
        assert_eq!(cleaned["enum"], json!(["x"]));
        assert!(cleaned.get("const").is_none());
    }

    #[test]
    fn test_ref_collapses_without_siblings() {
        let schema = json!({
            "$ref": "#/definitions/Widget",
            "description": "discarded",
            "properties": { "x": { "type": "number" } },
        });
        let cleaned = clean_schema(&schema, CleanMode::Full);

        assert_eq!(
            cleaned,
            json!({ "type": "object", "description": "See: Widget" })
        );
    }

    #[test]
    fn test_type_array_flattens_with_nullable_hint() {
        let schema = json!({
            "type": "object",
            "properties": {
                "name": { "type": ["string", "null"], "description": "a name" }
            },
            "required": ["name"],
        });
        let cleaned = clean_schema(&schema, CleanMode::Full);

        let name = &cleaned["properties"]["name"];
        assert_eq!(name["type"], "string");
        assert_eq!(name["description"], "a name (nullable)");
        // Nullable fields leave the required list.
        assert_eq!(cleaned["required"], json!([]));
    }

    #[test]
    fn test_all_of_merges_properties_and_required() {
        let schema = json!({
            "allOf": [
                { "properties": { "a": { "type": "string" } }, "required": ["a"] },
                { "properties": { "b": { "type": "number" } }, "required": ["b"] },
            ]
        });
        let cleaned = clean_schema(&schema, CleanMode::Full);

        assert!(cleaned.get("allOf").is_none());
        assert_eq!(cleaned["type"], "object");
        assert!(cleaned["properties"].get("a").is_some());
        assert!(cleaned["properties"].get("b").is_some());
        assert_eq!(cleaned["required"], json!(["a", "b"]));
    }

    #[test]
    fn test_any_of_prefers_object_branch() {
        let schema = json!({
            "anyOf": [
                { "type": "string" },
                { "type": "object", "properties": { "id": { "type": "string" } } },
            ]
        });
        let cleaned = clean_schema(&schema, CleanMode::Full);

        assert_eq!(cleaned["type"], "object");
        assert!(cleaned["properties"].get("id").is_some());
        assert!(cleaned["description"]
            .as_str()
            .unwrap()
            .contains("Accepts: string, object"));
    }

    #[test]
    fn test_constraints_fold_into_description() {
        let schema = json!({
            "type": "string",
            "minLength": 3,
            "pattern": "^a.*",
            "title": "Name",
            "x-internal": true,
        });
        let cleaned = clean_schema(&schema, CleanMode::Full);

        assert!(cleaned.get("minLength").is_none());
        assert!(cleaned.get("pattern").is_none());
        assert!(cleaned.get("title").is_none());
        assert!(cleaned.get("x-internal").is_none());
        let desc = cleaned["description"].as_str().unwrap();
        assert!(desc.contains("minLength: 3"));
        assert!(desc.contains("pattern: ^a.*"));
    }

    #[test]
    fn test_empty_top_level_object_gains_reason() {
        let cleaned = clean_schema(&json!({ "type": "object" }), CleanMode::Full);

        assert!(cleaned["properties"].get("reason").is_some());
        assert_eq!(cleaned["required"], json!(["reason"]));
    }

    #[test]
    fn test_nested_empty_object_left_alone() {
        let schema = json!({
            "type": "object",
            "properties": { "opts": { "type": "object" } },
        });
        let cleaned = clean_schema(&schema, CleanMode::Full);

        assert!(cleaned["properties"]["opts"].get("properties").is_none());
    }

    #[test]
    fn test_nested_object_without_required_gains_placeholder() {
        let schema = json!({
            "type": "object",
            "properties": {
                "opts": {
                    "type": "object",
                    "properties": { "verbose": { "type": "boolean" } },
                }
            },
            "required": ["opts"],
        });
        let cleaned = clean_schema(&schema, CleanMode::Full);

        assert!(cleaned["properties"]["opts"]["properties"].get("_").is_some());
    }

    #[test]
    fn test_light_mode_strips_nullable_without_placeholders() {
        let schema = json!({ "type": "object", "nullable": true });
        let cleaned = clean_schema(&schema, CleanMode::Light);

        assert!(cleaned.get("nullable").is_none());
        assert!(cleaned.get("properties").is_none());
    }
}
