//! Record-level CRUD handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{str::FromStr, sync::Arc};
use tracing::debug;

use datagate_core::{
    Error, Record, Result, TenantContext,
    options::{ArrayAction, ArrayMutation, FieldType, InsertOptions, JoinSpec, UpdateOptions},
};

use crate::{envelope::records_value, state::GatewayState, types::ApiResult};

#[derive(Debug, Deserialize)]
pub struct CollectionPath {
    pub collection: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordPath {
    pub collection: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ArrayPath {
    pub collection: String,
    pub id: String,
    pub array_field: String,
}

/// `?join=<collection>&sub=<field>`; expansion happens only when both are set
#[derive(Debug, Default, Deserialize)]
pub struct JoinParams {
    pub join: Option<String>,
    pub sub: Option<String>,
}

impl JoinParams {
    pub fn into_join(self) -> Option<JoinSpec> {
        match (self.join, self.sub) {
            (Some(collection), Some(field)) if !collection.is_empty() && !field.is_empty() => {
                Some(JoinSpec { collection, field })
            }
            _ => None,
        }
    }
}

/// `{data, options}` body shared by insert and update
#[derive(Debug, Deserialize)]
#[serde(bound = "O: DeserializeOwned + Default")]
pub struct WriteBody<O> {
    pub data: Record,
    #[serde(default)]
    pub options: O,
}

/// `{action, element, newElement?, type?}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayBody {
    pub action: String,
    #[serde(default)]
    pub element: Value,
    #[serde(default)]
    pub new_element: Option<Value>,
    #[serde(default, rename = "type")]
    pub element_type: Option<String>,
}

impl ArrayBody {
    pub fn into_mutation(self, field: String) -> Result<ArrayMutation> {
        let action = ArrayAction::from_str(&self.action)?;
        let element_type = match self.element_type.as_deref() {
            Some("objectId") | Some("identifier") => Some(FieldType::ObjectId),
            Some("number") => Some(FieldType::Number),
            _ => None,
        };
        Ok(ArrayMutation {
            field,
            action,
            element: self.element,
            new_element: self.new_element,
            element_type,
        })
    }
}

/// Decode a JSON body, reporting both JSON and shape errors as malformed
pub(crate) fn parse_body<T: DeserializeOwned>(
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<T> {
    let Json(value) = body.map_err(|e| Error::malformed(e.body_text()))?;
    serde_json::from_value(value).map_err(|e| Error::malformed(e.to_string()))
}

pub async fn list_all(
    State(state): State<Arc<GatewayState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<CollectionPath>,
) -> ApiResult<Json<Value>> {
    let backend = state.backend(&tenant).await?;
    let records = backend.list_all(&path.collection, None).await?;
    Ok(Json(records_value(records)))
}

pub async fn get_by_id(
    State(state): State<Arc<GatewayState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<RecordPath>,
    Query(params): Query<JoinParams>,
) -> ApiResult<Json<Value>> {
    let backend = state.backend(&tenant).await?;
    let join = params.into_join();
    if join.is_some() && !backend.capabilities().supports_join {
        return Err(Error::unsupported("join").into());
    }

    let record = backend
        .get_by_id(&path.collection, &path.id, join.as_ref())
        .await?;
    Ok(Json(Value::Object(record)))
}

pub async fn insert(
    State(state): State<Arc<GatewayState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<CollectionPath>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body: WriteBody<InsertOptions> = parse_body(body)?;
    let backend = state.backend(&tenant).await?;
    let created = backend
        .insert(&path.collection, body.data, &body.options)
        .await?;
    debug!("Inserted into '{}' for {}", path.collection, tenant.display_id());
    Ok((StatusCode::CREATED, Json(Value::Object(created))))
}

pub async fn update(
    State(state): State<Arc<GatewayState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<RecordPath>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body: WriteBody<UpdateOptions> = parse_body(body)?;
    let backend = state.backend(&tenant).await?;
    let updated = backend
        .update(&path.collection, &path.id, body.data, &body.options)
        .await?;
    Ok(Json(Value::Object(updated)))
}

pub async fn remove(
    State(state): State<Arc<GatewayState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<RecordPath>,
) -> ApiResult<Json<Value>> {
    let backend = state.backend(&tenant).await?;
    backend.remove(&path.collection, &path.id).await?;
    Ok(Json(json!({ "message": "Item deleted" })))
}

pub async fn mutate_array(
    State(state): State<Arc<GatewayState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<ArrayPath>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body: ArrayBody = parse_body(body)?;
    let mutation = body.into_mutation(path.array_field)?;
    let backend = state.backend(&tenant).await?;
    let record = backend
        .mutate_array(&path.collection, &path.id, &mutation)
        .await?;
    Ok(Json(Value::Object(record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use datagate_core::ValidationError;

    #[test]
    fn test_join_requires_both_params() {
        let both = JoinParams {
            join: Some("tags".into()),
            sub: Some("tagIds".into()),
        };
        assert_eq!(
            both.into_join(),
            Some(JoinSpec {
                collection: "tags".into(),
                field: "tagIds".into()
            })
        );
        let half = JoinParams {
            join: Some("tags".into()),
            sub: None,
        };
        assert_eq!(half.into_join(), None);
        assert_eq!(JoinParams::default().into_join(), None);
    }

    #[test]
    fn test_array_body_parsing() {
        let body: ArrayBody = serde_json::from_value(json!({
            "action": "update",
            "element": "a",
            "newElement": "b",
            "type": "identifier"
        }))
        .unwrap();
        let mutation = body.into_mutation("tags".into()).unwrap();
        assert_eq!(mutation.action, ArrayAction::Update);
        assert_eq!(mutation.new_element, Some(json!("b")));
        assert_eq!(mutation.element_type, Some(FieldType::ObjectId));

        let body: ArrayBody =
            serde_json::from_value(json!({"action": "append", "element": 1})).unwrap();
        assert!(matches!(
            body.into_mutation("tags".into()),
            Err(Error::Validation(ValidationError::InvalidAction(a))) if a == "append"
        ));
    }

    #[test]
    fn test_write_body_requires_object_data() {
        let ok: WriteBody<InsertOptions> = parse_body(Ok(Json(json!({
            "data": {"email": "a@b.com"},
            "options": {"uniqueFields": [["email"]]}
        }))))
        .unwrap();
        assert_eq!(ok.options.unique_fields, vec![vec!["email".to_string()]]);

        let no_options: WriteBody<UpdateOptions> =
            parse_body(Ok(Json(json!({"data": {"name": "A"}})))).unwrap();
        assert_eq!(no_options.options, UpdateOptions::default());

        let err = parse_body::<WriteBody<InsertOptions>>(Ok(Json(json!({"data": [1, 2]}))));
        assert!(matches!(
            err,
            Err(Error::Validation(ValidationError::MalformedBody(_)))
        ));
    }
}
