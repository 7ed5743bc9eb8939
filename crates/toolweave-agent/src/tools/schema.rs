//! Static validation of tool descriptors as they enter the registry.
//!
//! Servers describe their tools with a JSON-Schema-like object. Anything the
//! model could not call reliably is rejected here, before it reaches the
//! merged catalog.

use serde_json::{json, Map, Value};
use toolweave_mcp::ToolDescriptor;

use super::registry::SEPARATOR;

/// Whether `name` is usable as a tool name inside a qualified name.
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(SEPARATOR)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validate a descriptor and normalize its schema.
///
/// A missing schema becomes an empty object schema and a schema without
/// `type` gets `"type": "object"`. Returns the reason on rejection.
pub fn validate_descriptor(descriptor: ToolDescriptor) -> Result<ToolDescriptor, String> {
    if !is_valid_tool_name(&descriptor.name) {
        return Err(format!("invalid tool name '{}'", descriptor.name));
    }

    let schema = normalize_schema(descriptor.input_schema)?;
    Ok(ToolDescriptor {
        input_schema: schema,
        ..descriptor
    })
}

fn normalize_schema(schema: Value) -> Result<Value, String> {
    let mut obj: Map<String, Value> = match schema {
        Value::Null => return Ok(json!({"type": "object", "properties": {}})),
        Value::Object(obj) => obj,
        other => return Err(format!("schema must be an object, got {other}")),
    };

    match obj.get("type") {
        None => {
            obj.insert("type".into(), json!("object"));
        }
        Some(Value::String(t)) if t == "object" => {}
        Some(other) => return Err(format!("schema type must be \"object\", got {other}")),
    }

    let declared: Option<&Map<String, Value>> = match obj.get("properties") {
        None => None,
        Some(Value::Object(props)) => Some(props),
        Some(_) => return Err("schema properties must be an object".into()),
    };

    if let Some(required) = obj.get("required") {
        let Value::Array(items) = required else {
            return Err("schema required must be an array".into());
        };
        for item in items {
            let Some(field) = item.as_str() else {
                return Err(format!("required entry {item} is not a string"));
            };
            if !declared.is_some_and(|props| props.contains_key(field)) {
                return Err(format!("required property '{field}' is not declared"));
            }
        }
    }

    Ok(Value::Object(obj))
}
