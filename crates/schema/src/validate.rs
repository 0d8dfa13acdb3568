use serde_json::Value;

const VALID_TYPES: [&str; 7] = [
    "object", "array", "string", "number", "integer", "boolean", "null",
];

/// Well-formedness checks that run before compilation. Returns the first
/// problem found; compilation itself is the caller's (cached) concern.
pub(crate) fn check_shape(schema: &Value) -> Result<(), Vec<String>> {
    if !schema.is_object() {
        return Err(vec![format!(
            "schema must be a JSON object, got {}",
            kind_of(schema)
        )]);
    }

    if let Some(declared) = schema.get("type") {
        match declared {
            Value::String(t) => check_type_name(t)?,
            Value::Array(types) => {
                for t in types {
                    match t.as_str() {
                        Some(name) => check_type_name(name)?,
                        None => {
                            return Err(vec![format!(
                                "invalid type entry {t}: type unions must contain strings"
                            )]);
                        }
                    }
                }
            }
            other => {
                return Err(vec![format!("invalid type {other}: expected a string")]);
            }
        }
    }

    Ok(())
}

fn check_type_name(name: &str) -> Result<(), Vec<String>> {
    if VALID_TYPES.contains(&name) {
        Ok(())
    } else {
        Err(vec![format!(
            "invalid type {name:?}: expected one of {}",
            VALID_TYPES.join(", ")
        )])
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn accepts_known_types() {
        for t in VALID_TYPES {
            assert!(check_shape(&json!({ "type": t })).is_ok());
        }
    }

    #[test]
    fn accepts_type_unions() {
        assert!(check_shape(&json!({ "type": ["object", "null"] })).is_ok());
    }

    #[test]
    fn rejects_unknown_type() {
        let errors = check_shape(&json!({ "type": "banana" })).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("invalid type"));
        assert!(errors[0].contains("banana"));
    }

    #[test]
    fn rejects_non_object_schema() {
        let errors = check_shape(&json!([1, 2, 3])).unwrap_err();
        assert!(errors[0].contains("must be a JSON object"));
    }

    #[test]
    fn rejects_non_string_union_member() {
        let errors = check_shape(&json!({ "type": ["object", 3] })).unwrap_err();
        assert!(errors[0].contains("type unions"));
    }
}
