// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A minimal declarative JSON-schema-style validator for `OrderTypeContract::schema()`
//! (§4.4, §9 "Dynamic JSON payload validation"). Supports the subset of JSON
//! Schema that plugged-in order types need to describe a payload shape:
//! `type`, `required`, `properties`, `minimum`/`maximum`, `minLength`/
//! `maxLength`, and `enum`. Unknown keywords are ignored rather than
//! rejected, so a schema can carry documentation-only fields.

use serde_json::Value;

use wocp_core::FieldError;

/// Validates `payload` against `schema`, collecting every violation instead
/// of stopping at the first one (so the caller gets the full field-error
/// list required by `validation-failed`).
pub fn validate(schema: &Value, payload: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();
    validate_at("$", schema, payload, &mut errors);
    errors
}

fn validate_at(path: &str, schema: &Value, value: &Value, errors: &mut Vec<FieldError>) {
    let Some(schema) = schema.as_object() else { return };

    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            errors.push(FieldError::new(path, format!("expected type {expected}")));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            errors.push(FieldError::new(path, "value is not one of the allowed enum values"));
        }
    }

    match value {
        Value::Object(object) => {
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for key in required {
                    if let Some(key) = key.as_str() {
                        if !object.contains_key(key) {
                            errors.push(FieldError::new(format!("{path}.{key}"), "required field missing"));
                        }
                    }
                }
            }
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (key, sub_schema) in properties {
                    if let Some(sub_value) = object.get(key) {
                        validate_at(&format!("{path}.{key}"), sub_schema, sub_value, errors);
                    }
                }
            }
        }
        Value::String(s) => {
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if (s.len() as u64) < min {
                    errors.push(FieldError::new(path, format!("shorter than minLength {min}")));
                }
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                if (s.len() as u64) > max {
                    errors.push(FieldError::new(path, format!("longer than maxLength {max}")));
                }
            }
        }
        Value::Number(n) => {
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
                if n.as_f64().is_some_and(|v| v < min) {
                    errors.push(FieldError::new(path, format!("below minimum {min}")));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
                if n.as_f64().is_some_and(|v| v > max) {
                    errors.push(FieldError::new(path, format!("above maximum {max}")));
                }
            }
        }
        _ => {}
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_field_is_reported() {
        let schema = json!({"type": "object", "required": ["msg"]});
        let errors = validate(&schema, &json!({}));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].field.ends_with("msg"));
    }

    #[test]
    fn nested_property_type_mismatch_is_reported() {
        let schema = json!({
            "type": "object",
            "properties": { "count": { "type": "integer" } }
        });
        let errors = validate(&schema, &json!({"count": "not a number"}));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn valid_payload_has_no_errors() {
        let schema = json!({
            "type": "object",
            "required": ["msg"],
            "properties": { "msg": { "type": "string", "minLength": 1 } }
        });
        assert!(validate(&schema, &json!({"msg": "hi"})).is_empty());
    }
}
