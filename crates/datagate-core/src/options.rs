//! Write options carried by insert, update and array-mutation requests

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::{Error, Record, ValidationError};

/// Target type for a `fieldType` cast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "number")]
    Number,
    /// Backend-native identifier (ObjectId on the document store)
    #[serde(rename = "objectId", alias = "identifier")]
    ObjectId,
}

/// Options accepted by `insert`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOptions {
    /// `[field, type]` pairs cast before the write
    #[serde(default)]
    pub field_type: Vec<(String, FieldType)>,

    /// Field combinations that must not already exist
    #[serde(default)]
    pub unique_fields: Vec<Vec<String>>,

    #[serde(default)]
    pub text_index_fields: Vec<String>,
}

impl InsertOptions {
    /// Fields to probe for uniqueness, flattened in declaration order
    /// without repeats. Fields absent from `data` are skipped.
    pub fn unique_candidate_fields(&self, data: &Record) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for field in self.unique_fields.iter().flatten() {
            if data.contains_key(field) && !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        fields
    }
}

/// Options accepted by `update`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Single field that must stay unique across records
    #[serde(default)]
    pub unique: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayAction {
    Add,
    Update,
    Remove,
}

impl FromStr for ArrayAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(ArrayAction::Add),
            "update" => Ok(ArrayAction::Update),
            "remove" => Ok(ArrayAction::Remove),
            other => Err(ValidationError::InvalidAction(other.to_string()).into()),
        }
    }
}

/// A parsed array-field mutation
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayMutation {
    pub field: String,
    pub action: ArrayAction,
    pub element: Value,
    pub new_element: Option<Value>,
    pub element_type: Option<FieldType>,
}

impl ArrayMutation {
    /// Replacement value for `update`
    ///
    /// # Errors
    /// - `ValidationError::MalformedBody` if `newElement` was not supplied
    pub fn replacement(&self) -> crate::Result<&Value> {
        self.new_element
            .as_ref()
            .ok_or_else(|| Error::malformed("newElement is required for update"))
    }
}

/// Join expansion for `get_by_id`: replace the id array in `field` with the
/// matching records from `collection`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub collection: String,
    pub field: String,
}

/// Cast a value to a JSON number. Strings are parsed, numbers pass through,
/// anything else is returned unchanged.
pub fn coerce_number(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Value::from(i)
            } else if let Ok(f) = trimmed.parse::<f64>()
                && let Some(n) = serde_json::Number::from_f64(f)
            {
                Value::Number(n)
            } else {
                value.clone()
            }
        }
        Value::Bool(b) => Value::from(u8::from(*b)),
        _ => value.clone(),
    }
}

/// Cast a value to the generic identifier form (its string rendering)
pub fn coerce_identifier(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        Value::Number(n) => Value::String(n.to_string()),
        _ => value.clone(),
    }
}

/// Apply `fieldType` casts in place for backends without a native
/// identifier type
pub fn apply_field_types(data: &mut Record, casts: &[(String, FieldType)]) {
    for (field, kind) in casts {
        if let Some(value) = data.get_mut(field) {
            if value.is_null() {
                continue;
            }
            *value = match kind {
                FieldType::Number => coerce_number(value),
                FieldType::ObjectId => coerce_identifier(value),
            };
        }
    }
}
