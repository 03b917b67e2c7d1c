use serde_json::{Map, Value};

use crate::features::query_agent::error::ToolError;

/// Check model-supplied arguments against a tool's input schema.
///
/// Covers what tool schemas here actually use: an object with `required`
/// fields and typed `properties`. A missing (null) argument object counts as
/// `{}`. Returns the arguments to hand to the tool.
pub fn validate_args(schema: &Value, args: &Value) -> Result<Value, ToolError> {
    let object = match args {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(ToolError::Validation(format!(
                "arguments must be a JSON object, got {}",
                json_type_name(other)
            )))
        }
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            match object.get(field) {
                None | Some(Value::Null) => {
                    return Err(ToolError::Validation(format!(
                        "missing required field '{}'",
                        field
                    )))
                }
                Some(_) => {}
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, value) in &object {
            if value.is_null() {
                continue;
            }
            let Some(expected) = properties.get(field).and_then(|p| p.get("type")) else {
                continue;
            };
            if !matches_type(expected, value) {
                return Err(ToolError::Validation(format!(
                    "field '{}' must be of type {}, got {}",
                    field,
                    expected,
                    json_type_name(value)
                )));
            }
        }
    }

    Ok(Value::Object(object))
}

fn matches_type(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_type_name(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type_name(name, value)),
        _ => true,
    }
}

fn matches_type_name(name: &str, value: &Value) -> bool {
    match name {
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

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
