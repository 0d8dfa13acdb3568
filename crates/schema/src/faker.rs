use chrono::{TimeDelta, Utc};
use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::{Word, Words};
use fake::uuid::UUIDv4;
use rand::Rng;
use serde_json::{Map, Number, Value};

const DEFAULT_MIN_NUMBER: f64 = 0.0;
const DEFAULT_MAX_NUMBER: f64 = 1000.0;
const DEFAULT_MIN_ITEMS: u64 = 1;
const DEFAULT_MAX_ITEMS: u64 = 3;

// Ten years, in seconds. Random timestamps land in this window before "now".
const TIMESTAMP_SPREAD_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Synthesize one value for a schema node.
///
/// Every declared property is generated, including optional ones; callers
/// that need the strict subset run the post-pass in `generate`.
pub(crate) fn fake<R: Rng + ?Sized>(schema: &Value, rng: &mut R) -> Value {
    let Some(node) = schema.as_object() else {
        return Value::Null;
    };

    if let Some(constant) = node.get("const") {
        return constant.clone();
    }
    if let Some(choices) = node.get("enum").and_then(Value::as_array) {
        if choices.is_empty() {
            return Value::Null;
        }
        return choices[rng.random_range(0..choices.len())].clone();
    }

    match effective_type(node) {
        Some("object") => fake_object(node, rng),
        Some("array") => fake_array(node, rng),
        Some("string") => Value::String(fake_string(node, rng)),
        Some("integer") => fake_integer(node, rng),
        Some("number") => fake_number(node, rng),
        Some("boolean") => Value::Bool(rng.random_bool(0.5)),
        Some("null") => Value::Null,
        // No usable type: infer from structure, else null.
        _ => {
            if node.get("properties").is_some_and(Value::is_object) {
                fake_object(node, rng)
            } else if node.get("items").is_some() {
                fake_array(node, rng)
            } else {
                Value::Null
            }
        }
    }
}

/// Resolve the generated branch of a `type` field. Unions such as
/// `["object", "null"]` generate the first non-null branch.
fn effective_type(node: &Map<String, Value>) -> Option<&str> {
    match node.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .or(Some("null")),
        _ => None,
    }
}

fn fake_object<R: Rng + ?Sized>(node: &Map<String, Value>, rng: &mut R) -> Value {
    let mut out = Map::new();
    if let Some(props) = node.get("properties").and_then(Value::as_object) {
        for (name, prop_schema) in props {
            out.insert(name.clone(), fake(prop_schema, rng));
        }
    }
    Value::Object(out)
}

fn fake_array<R: Rng + ?Sized>(node: &Map<String, Value>, rng: &mut R) -> Value {
    let item_schema = node.get("items");
    let min = node
        .get("minItems")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_MIN_ITEMS);
    let max = node
        .get("maxItems")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_MAX_ITEMS)
        .max(min);

    let len = rng.random_range(min..=max) as usize;
    let items = match item_schema {
        Some(schema) => (0..len).map(|_| fake(schema, rng)).collect(),
        None => Vec::new(),
    };
    Value::Array(items)
}

fn fake_string<R: Rng + ?Sized>(node: &Map<String, Value>, rng: &mut R) -> String {
    match node.get("format").and_then(Value::as_str) {
        Some("uuid") => {
            let id: uuid::Uuid = UUIDv4.fake_with_rng(rng);
            return id.to_string();
        }
        Some("email") => return SafeEmail().fake_with_rng(rng),
        Some("date-time") => {
            let offset = rng.random_range(0..TIMESTAMP_SPREAD_SECS);
            return (Utc::now() - TimeDelta::seconds(offset)).to_rfc3339();
        }
        Some("date") => {
            let offset = rng.random_range(0..TIMESTAMP_SPREAD_SECS);
            return (Utc::now() - TimeDelta::seconds(offset))
                .date_naive()
                .to_string();
        }
        _ => {}
    }

    let words: Vec<String> = Words(1..4).fake_with_rng(rng);
    let mut text = words.join(" ");

    if let Some(min) = node.get("minLength").and_then(Value::as_u64) {
        while (text.len() as u64) < min {
            text.push('x');
        }
    }
    if let Some(max) = node.get("maxLength").and_then(Value::as_u64) {
        text.truncate(max as usize);
    }
    text
}

fn fake_integer<R: Rng + ?Sized>(node: &Map<String, Value>, rng: &mut R) -> Value {
    let min = node
        .get("minimum")
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_MIN_NUMBER as i64);
    let max = node
        .get("maximum")
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_MAX_NUMBER as i64)
        .max(min);
    Value::Number(Number::from(rng.random_range(min..=max)))
}

fn fake_number<R: Rng + ?Sized>(node: &Map<String, Value>, rng: &mut R) -> Value {
    let min = node
        .get("minimum")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_MIN_NUMBER);
    let max = node
        .get("maximum")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_MAX_NUMBER)
        .max(min);
    let sample = min + (max - min) * rng.random::<f64>();
    Number::from_f64(sample).map_or(Value::Null, Value::Number)
}
