use serde_json::{Map, Value};

use crate::api::Mode;

/// Deterministic serialization of a schema, used as the cache key.
///
/// `serde_json` maps are ordered, so `to_string` of the same logical schema
/// always yields the same byte sequence.
pub fn canonical_key(schema: &Value) -> String {
    schema.to_string()
}

pub(crate) fn prepare(schema: &Value, mode: Mode) -> Value {
    prepare_node(schema, mode)
}

fn prepare_node(value: &Value, mode: Mode) -> Value {
    match value {
        Value::Object(map) => Value::Object(prepare_object(map, mode)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| prepare_node(v, mode)).collect())
        }
        other => other.clone(),
    }
}

fn prepare_object(map: &Map<String, Value>, mode: Mode) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in map {
        // `$id` fields confuse downstream compilers that key caches by id;
        // they are stripped at every depth.
        if key == "$id" {
            continue;
        }
        out.insert(key.clone(), prepare_node(value, mode));
    }

    if out.get("properties").is_some_and(Value::is_object) {
        match mode {
            Mode::Strict => {
                out.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            Mode::Fuzz => {
                // An object-valued policy is kept (it was already descended
                // above); only unset or `false` upgrades to `true`.
                let closed = matches!(
                    out.get("additionalProperties"),
                    None | Some(Value::Bool(false))
                );
                if closed {
                    out.insert("additionalProperties".to_string(), Value::Bool(true));
                }
            }
        }
    }

    out
}
