//! Tool JSON-Schema cleaning for backends with restricted schema support.
//!
//! Some providers behind the router reject `additionalProperties`, `default`, and most
//! `format` values. Cleaning is pure and idempotent and never fails: scalar leaves pass
//! through untouched.

use serde_json::Value;

/// `format` values that restricted backends still accept.
const ALLOWED_FORMATS: &[&str] = &["date-time", "enum"];

/// Return a cleaned copy of `schema` with unsupported keys removed at every level.
pub fn clean_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut result = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                match key.as_str() {
                    "additionalProperties" | "default" => {}
                    "format" => {
                        let allowed = value
                            .as_str()
                            .is_some_and(|f| ALLOWED_FORMATS.contains(&f));
                        if allowed {
                            result.insert(key.clone(), value.clone());
                        } else {
                            tracing::debug!(format = %value, "Dropping unsupported schema format");
                        }
                    }
                    // Property names are user data, not schema keywords
                    "properties" | "definitions" | "$defs" if value.is_object() => {
                        let props = value
                            .as_object()
                            .into_iter()
                            .flatten()
                            .map(|(name, prop)| (name.clone(), clean_schema(prop)))
                            .collect();
                        result.insert(key.clone(), Value::Object(props));
                    }
                    _ => {
                        result.insert(key.clone(), clean_schema(value));
                    }
                }
            }
            Value::Object(result)
        }
        Value::Array(items) => Value::Array(items.iter().map(clean_schema).collect()),
        other => other.clone(),
    }
}
