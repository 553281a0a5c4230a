//! Firestore typed value encoding
//!
//! Firestore wraps every value in a single-key object naming its type
//! (`stringValue`, `integerValue`, `mapValue`, ...). `integerValue` is a
//! decimal string on the wire; it decodes to a JSON number only when it is a
//! safe integer, otherwise it stays a string.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use datagate_core::{
    NotFound, Record, Result,
    options::{ArrayAction, ArrayMutation},
    record::{coerce_element, display_element},
};

/// Largest magnitude a JSON number can carry without precision loss
pub const MAX_SAFE_INTEGER: i64 = 1 << 53;

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or_default() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            if values.is_empty() {
                json!({ "arrayValue": {} })
            } else {
                json!({ "arrayValue": { "values": values } })
            }
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn encode_fields(record: &Record) -> Map<String, Value> {
    record
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// RFC 3339 timestamp as a native `timestampValue`
pub fn timestamp_value(rfc3339: &str) -> Value {
    json!({ "timestampValue": rfc3339 })
}

fn decode_integer(raw: &Value) -> Value {
    let parsed = match raw {
        Value::String(s) => s.parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    };
    match parsed {
        Some(i) if i.unsigned_abs() <= MAX_SAFE_INTEGER as u64 => Value::from(i),
        Some(i) => Value::String(i.to_string()),
        None => raw.clone(),
    }
}

pub fn decode_value(value: &Value) -> Value {
    let Some(map) = value.as_object() else {
        return value.clone();
    };
    let Some((kind, inner)) = map.iter().next() else {
        return Value::Null;
    };

    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "stringValue" | "timestampValue" | "bytesValue" | "referenceValue"
        | "geoPointValue" => inner.clone(),
        "integerValue" => decode_integer(inner),
        // NaN and the infinities arrive as strings
        "doubleValue" => match inner {
            Value::Number(_) => inner.clone(),
            _ => Value::Null,
        },
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        _ => inner.clone(),
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Record {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect()
}

/// Apply an array mutation to a stored field, returning the new `arrayValue`.
///
/// Elements are matched in decoded form but stored elements are written back
/// exactly as read, so their wire types survive. A missing or non-array field
/// starts out empty.
///
/// # Errors
/// - `NotFound::Element` if `update` cannot find the element
/// - `ValidationError::MalformedBody` if `update` has no replacement
pub fn mutate_array_value(stored: Option<&Value>, mutation: &ArrayMutation) -> Result<Value> {
    let mut items: Vec<Value> = stored
        .and_then(|v| v.get("arrayValue"))
        .and_then(|array| array.get("values"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let element = coerce_element(&mutation.element, mutation.element_type);
    let position = items.iter().position(|item| decode_value(item) == element);

    match mutation.action {
        ArrayAction::Add => {
            if position.is_none() {
                items.push(encode_value(&element));
            }
        }
        ArrayAction::Update => {
            let replacement = coerce_element(mutation.replacement()?, mutation.element_type);
            let Some(index) = position else {
                return Err(NotFound::Element {
                    element: display_element(&mutation.element),
                    field: mutation.field.clone(),
                }
                .into());
            };
            items[index] = encode_value(&replacement);
        }
        ArrayAction::Remove => items.retain(|item| decode_value(item) != element),
    }

    if items.is_empty() {
        Ok(json!({ "arrayValue": {} }))
    } else {
        Ok(json!({ "arrayValue": { "values": items } }))
    }
}

/// A Firestore document resource
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// `projects/{p}/databases/{d}/documents/{collection}/{id}`
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
}

impl Document {
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }

    /// `{id, ...fields}` with decoded values
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("id".to_string(), Value::String(self.id().to_string()));
        for (k, v) in decode_fields(&self.fields) {
            record.insert(k, v);
        }
        record
    }
}

/// Field path for masks and filters; names outside `[A-Za-z_][A-Za-z0-9_]*`
/// are backtick-quoted
pub fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// `field == value` as a structured query filter
pub fn equality_filter(field: &str, value: &Value) -> Value {
    if value.is_null() {
        json!({
            "unaryFilter": { "op": "IS_NULL", "field": { "fieldPath": field_path(field) } }
        })
    } else {
        json!({
            "fieldFilter": {
                "field": { "fieldPath": field_path(field) },
                "op": "EQUAL",
                "value": encode_value(value)
            }
        })
    }
}
