//! JSON Schema validation for tool inputs and outputs.
//!
//! The built-in [`BasicSchemaValidator`] checks the subset of JSON Schema
//! that tool schemas use in practice: the top-level type, required fields,
//! per-property types, string enums and closed objects. Plug in a richer
//! validator through [`SchemaValidator`] when needed.

use std::fmt;

/// Validates a value against a JSON Schema.
pub trait SchemaValidator: Send + Sync + fmt::Debug {
    /// Returns `Err(message)` describing the first violation found.
    fn validate(&self, value: &serde_json::Value, schema: &serde_json::Value) -> Result<(), String>;
}

/// Default validator backed by [`validate_arguments`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSchemaValidator;

impl SchemaValidator for BasicSchemaValidator {
    fn validate(&self, value: &serde_json::Value, schema: &serde_json::Value) -> Result<(), String> {
        validate_arguments(value, schema)
    }
}

/// Validate a value against a JSON Schema.
pub fn validate_arguments(
    args: &serde_json::Value,
    schema: &serde_json::Value,
) -> Result<(), String> {
    if let Some(schema_type) = schema.get("type").and_then(|v| v.as_str()) {
        if !value_matches_type(args, schema_type) {
            return Err(format!(
                "expected {schema_type}, got {}",
                json_type_name(args)
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|v| v.as_array()) {
        if !allowed.contains(args) {
            return Err(format!("value {args} is not one of the allowed values"));
        }
    }

    let Some(obj) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
        for name in required.iter().filter_map(|f| f.as_str()) {
            if !obj.contains_key(name) {
                return Err(format!("missing required field '{name}'"));
            }
        }
    }

    let properties = schema.get("properties").and_then(|v| v.as_object());
    let closed = schema.get("additionalProperties") == Some(&serde_json::Value::Bool(false));

    for (key, value) in obj {
        match properties.and_then(|p| p.get(key)) {
            Some(prop_schema) => {
                validate_arguments(value, prop_schema).map_err(|e| format!("field '{key}': {e}"))?;
            }
            None if closed => return Err(format!("unexpected field '{key}'")),
            None => {}
        }
    }

    Ok(())
}

fn value_matches_type(value: &serde_json::Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
