//! Generic record representation and in-memory record transforms

use serde_json::Value;

use crate::{
    NotFound, Result,
    options::{ArrayAction, ArrayMutation, FieldType, coerce_identifier},
};

/// A record as exchanged with callers: field name to JSON value
pub type Record = serde_json::Map<String, Value>;

/// Remove every `hidden` field from a record
pub fn strip_hidden(record: &mut Record, hidden: &[String]) {
    for field in hidden {
        record.remove(field);
    }
}

/// Remove `hidden` fields from a JSON value: objects directly, arrays
/// element-wise. Scalars are left alone.
pub fn strip_hidden_value(value: &mut Value, hidden: &[String]) {
    if hidden.is_empty() {
        return;
    }
    match value {
        Value::Object(map) => strip_hidden(map, hidden),
        Value::Array(items) => {
            for item in items {
                if let Value::Object(map) = item {
                    strip_hidden(map, hidden);
                }
            }
        }
        _ => {}
    }
}

/// Coerce mutation operands according to `elementType`
pub fn coerce_element(value: &Value, element_type: Option<FieldType>) -> Value {
    match element_type {
        Some(FieldType::ObjectId) => coerce_identifier(value),
        Some(FieldType::Number) => crate::options::coerce_number(value),
        None => value.clone(),
    }
}

/// Apply an array mutation to a record held in memory.
///
/// Used by backends without native array operators. The target field is
/// initialized to an empty array when absent or not an array. Elements are
/// compared by deep structural equality.
///
/// # Errors
/// - `NotFound::Element` if `update` cannot find the element
/// - `ValidationError::MalformedBody` if `update` has no replacement
pub fn apply_array_mutation(record: &mut Record, mutation: &ArrayMutation) -> Result<()> {
    let element = coerce_element(&mutation.element, mutation.element_type);

    let slot = record
        .entry(mutation.field.clone())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    let Value::Array(items) = slot else {
        return Ok(());
    };

    match mutation.action {
        ArrayAction::Add => {
            if !items.contains(&element) {
                items.push(element);
            }
        }
        ArrayAction::Update => {
            let replacement = coerce_element(mutation.replacement()?, mutation.element_type);
            match items.iter().position(|item| *item == element) {
                Some(index) => items[index] = replacement,
                None => {
                    return Err(NotFound::Element {
                        element: display_element(&mutation.element),
                        field: mutation.field.clone(),
                    }
                    .into());
                }
            }
        }
        ArrayAction::Remove => items.retain(|item| *item != element),
    }

    Ok(())
}

/// Render an element for error messages: strings bare, everything else as JSON
pub fn display_element(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
