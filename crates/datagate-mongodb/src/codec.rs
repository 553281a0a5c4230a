//! JSON <-> BSON conversion
//!
//! Input is parsed as Extended JSON v2, so `{"$oid": "..."}` and
//! `{"$date": "..."}` reach the driver as native types. Output is flattened
//! to plain JSON for callers that do not speak Extended JSON.

use mongodb::bson::{self, Bson, Document, doc, oid::ObjectId};
use serde_json::Value;

use datagate_core::{
    Error, Record, Result, clock,
    options::{FieldType, coerce_number},
};

pub fn json_to_bson(value: Value) -> Result<Bson> {
    Bson::try_from(value).map_err(|e| Error::malformed(format!("Invalid extended JSON: {}", e)))
}

/// Convert a JSON object to a document
///
/// # Errors
/// - `ValidationError::MalformedBody` if the value is not an object
pub fn json_to_document(value: Value) -> Result<Document> {
    match json_to_bson(value)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(Error::malformed(format!(
            "Expected an object, got {:?}",
            other.element_type()
        ))),
    }
}

pub fn record_to_document(record: Record) -> Result<Document> {
    json_to_document(Value::Object(record))
}

pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::from(dt.timestamp_millis()),
        },
        Bson::Decimal128(d) => Value::String(d.to_string()),
        Bson::Document(doc) => Value::Object(document_to_record(doc)),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}

pub fn document_to_record(doc: Document) -> Record {
    doc.into_iter()
        .map(|(key, value)| (key, bson_to_json(value)))
        .collect()
}

/// Filter matching a path id: ObjectId when the id parses as one, otherwise
/// the raw string
pub fn id_filter(id: &str) -> Document {
    match ObjectId::parse_str(id) {
        Ok(oid) => doc! { "_id": oid },
        Err(_) => doc! { "_id": id },
    }
}

/// Cast a value to an ObjectId. String ids are parsed, ObjectIds pass through.
///
/// # Errors
/// - `ValidationError::MalformedBody` for any other value
pub fn to_object_id(value: &Bson) -> Result<Bson> {
    match value {
        Bson::ObjectId(_) => Ok(value.clone()),
        Bson::String(s) => ObjectId::parse_str(s)
            .map(Bson::ObjectId)
            .map_err(|_| Error::malformed(format!("Invalid ObjectId: {}", s))),
        other => Err(Error::malformed(format!("Invalid ObjectId: {}", other))),
    }
}

/// Convert a caller value to BSON honoring an optional `elementType`
pub fn typed_bson(value: &Value, kind: Option<FieldType>) -> Result<Bson> {
    match kind {
        Some(FieldType::Number) => json_to_bson(coerce_number(value)),
        Some(FieldType::ObjectId) => to_object_id(&json_to_bson(value.clone())?),
        None => json_to_bson(value.clone()),
    }
}

/// Apply `fieldType` casts to a document in place. Null and absent fields
/// are left alone.
pub fn apply_field_types(doc: &mut Document, casts: &[(String, FieldType)]) -> Result<()> {
    for (field, kind) in casts {
        let Some(current) = doc.get(field) else {
            continue;
        };
        if matches!(current, Bson::Null) {
            continue;
        }
        let cast = match kind {
            FieldType::Number => json_to_bson(coerce_number(&bson_to_json(current.clone())))?,
            FieldType::ObjectId => to_object_id(current)?,
        };
        doc.insert(field.clone(), cast);
    }
    Ok(())
}

/// Write timestamp as a BSON date
pub fn timestamp() -> Bson {
    Bson::DateTime(bson::DateTime::from_millis(
        clock::now().timestamp_millis(),
    ))
}

/// Id list of a join field, cast to ObjectIds where possible
pub fn join_ids(value: Option<&Bson>) -> Option<Vec<Bson>> {
    let Some(Bson::Array(items)) = value else {
        return None;
    };
    Some(
        items
            .iter()
            .map(|item| to_object_id(item).unwrap_or_else(|_| item.clone()))
            .collect(),
    )
}

/// Exclusion projection for hidden fields
pub fn hidden_projection(hidden: &[String]) -> Option<Document> {
    if hidden.is_empty() {
        return None;
    }
    let mut projection = Document::new();
    for field in hidden {
        projection.insert(field.clone(), 0);
    }
    Some(projection)
}
