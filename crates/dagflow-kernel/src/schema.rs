//! A minimal JSON Schema subset validator.
//!
//! The teacher's own `schema_validator.rs` is an explicit placeholder that
//! assumes validation passes once the body parses as JSON. This crate's
//! Plan/tool-input/tool-output validation needs the subset of JSON Schema
//! actually exercised by the spec: `type`, `required`, `properties`,
//! `items`, and `enum`. No registry crate in the retrieved pack pulls in a
//! full JSON Schema implementation, so this is hand-rolled rather than
//! fabricating a dependency.

use serde_json::Value;

pub fn validate_against_schema(instance: &Value, schema: &Value) -> Result<(), String> {
    validate(instance, schema, "$")
}

fn validate(instance: &Value, schema: &Value, path: &str) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    if let Some(ty) = schema_obj.get("type") {
        check_type(instance, ty, path)?;
    }

    if let Some(enum_values) = schema_obj.get("enum").and_then(Value::as_array) {
        if !enum_values.contains(instance) {
            return Err(format!("{path}: value not in enum {enum_values:?}"));
        }
    }

    if let Some(obj) = instance.as_object() {
        if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
            for key in required {
                let key = key.as_str().unwrap_or_default();
                if !obj.contains_key(key) {
                    return Err(format!("{path}: missing required field '{key}'"));
                }
            }
        }
        if let Some(props) = schema_obj.get("properties").and_then(Value::as_object) {
            for (key, sub_schema) in props {
                if let Some(value) = obj.get(key) {
                    validate(value, sub_schema, &format!("{path}.{key}"))?;
                }
            }
        }
    }

    if let Some(items_schema) = schema_obj.get("items") {
        if let Some(arr) = instance.as_array() {
            for (i, item) in arr.iter().enumerate() {
                validate(item, items_schema, &format!("{path}[{i}]"))?;
            }
        }
    }

    Ok(())
}

fn check_type(instance: &Value, ty: &Value, path: &str) -> Result<(), String> {
    let matches = |name: &str| -> bool {
        match name {
            "object" => instance.is_object(),
            "array" => instance.is_array(),
            "string" => instance.is_string(),
            "number" => instance.is_number(),
            "integer" => instance.is_i64() || instance.is_u64(),
            "boolean" => instance.is_boolean(),
            "null" => instance.is_null(),
            _ => true,
        }
    };
    let ok = match ty {
        Value::String(s) => matches(s),
        Value::Array(options) => options.iter().any(|t| t.as_str().is_some_and(matches)),
        _ => true,
    };
    if !ok {
        Err(format!("{path}: expected type {ty}, got {instance}"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_field_missing_fails() {
        let schema = json!({"type": "object", "required": ["urls"], "properties": {"urls": {"type": "array"}}});
        let instance = json!({});
        assert!(validate_against_schema(&instance, &schema).is_err());
    }

    #[test]
    fn well_formed_instance_passes() {
        let schema = json!({
            "type": "object",
            "required": ["urls"],
            "properties": {"urls": {"type": "array", "items": {"type": "string"}}}
        });
        let instance = json!({"urls": ["https://a", "https://b"]});
        assert!(validate_against_schema(&instance, &schema).is_ok());
    }

    #[test]
    fn enum_mismatch_fails() {
        let schema = json!({"type": "string", "enum": ["high", "medium", "low"]});
        assert!(validate_against_schema(&json!("extreme"), &schema).is_err());
        assert!(validate_against_schema(&json!("high"), &schema).is_ok());
    }
}
