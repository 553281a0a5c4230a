//! Generic query, count, search and relational passthrough handlers

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

use datagate_core::{
    Error, TenantContext,
    query::{QueryRequest, SqlRequest},
    record::strip_hidden_value,
};

use crate::{
    crud::{CollectionPath, parse_body},
    envelope::{paged, records_value},
    state::GatewayState,
    types::ApiResult,
};

#[derive(Debug, Deserialize)]
pub struct TablePath {
    pub table: String,
}

fn query_request(body: Result<Json<Value>, JsonRejection>) -> datagate_core::Result<QueryRequest> {
    let Json(value) = body.map_err(|e| Error::malformed(e.body_text()))?;
    QueryRequest::from_value(value)
}

/// `POST /{token}/{collection}/query`
pub async fn query(
    State(state): State<Arc<GatewayState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<CollectionPath>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = query_request(body)?;

    if request.is_find() {
        if let Some(paging) = &request.paging {
            paging.validate(state.settings.max_page_limit)?;
        }
        let find = request.find_query()?;
        let backend = state.backend(&tenant).await?;
        let result = backend.find(&path.collection, &find).await?;

        return Ok(Json(match request.paging {
            Some(paging) => paged(result.records, result.total, paging),
            None => records_value(result.records),
        }));
    }

    let operation = request.operation()?;
    let backend = state.backend(&tenant).await?;
    backend.capabilities().check(&operation)?;
    debug!("Invoking {} on '{}'", operation.method(), path.collection);

    let mut value = backend.invoke(&path.collection, &operation).await?;
    strip_hidden_value(&mut value, &request.hidden);
    Ok(Json(value))
}

/// `POST /{token}/{collection}/count`
pub async fn count(
    State(state): State<Arc<GatewayState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<CollectionPath>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = query_request(body)?;
    let backend = state.backend(&tenant).await?;

    if request.is_find() {
        let total = backend.count(&path.collection, request.filter()?).await?;
        return Ok(Json(json!(total)));
    }

    let operation = request.operation()?;
    backend.capabilities().check(&operation)?;
    let mut value = backend.invoke(&path.collection, &operation).await?;
    strip_hidden_value(&mut value, &request.hidden);
    Ok(Json(value))
}

/// `POST /{token}/{collection}/search`: the body is the native filter
pub async fn search(
    State(state): State<Arc<GatewayState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<CollectionPath>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let filter = match parse_body::<Value>(body)? {
        Value::Object(map) if map.is_empty() => None,
        v @ Value::Object(_) => Some(v),
        Value::Null => None,
        _ => return Err(Error::malformed("search filter must be an object").into()),
    };

    let backend = state.backend(&tenant).await?;
    let records = backend.list_all(&path.collection, filter).await?;
    Ok(Json(records_value(records)))
}

/// `POST /{token}/query`
pub async fn execute_sql(
    State(state): State<Arc<GatewayState>>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request: SqlRequest = parse_body(body)?;
    let backend = state.backend(&tenant).await?;
    if !backend.capabilities().supports_sql {
        return Err(Error::unsupported("query").into());
    }

    let result = backend.execute_sql(&request.query).await?;
    Ok(Json(json!({
        "data": records_value(result.rows),
        "total": result.total,
    })))
}

/// `GET /{token}/tables`
pub async fn list_tables(
    State(state): State<Arc<GatewayState>>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Json<Vec<String>>> {
    let backend = state.backend(&tenant).await?;
    Ok(Json(backend.list_collections().await?))
}

/// `DELETE /{token}/drop/{table}`
pub async fn drop_table(
    State(state): State<Arc<GatewayState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<TablePath>,
) -> ApiResult<Json<Value>> {
    let backend = state.backend(&tenant).await?;
    if !backend.capabilities().supports_drop {
        return Err(Error::unsupported("drop").into());
    }

    backend.drop_collection(&path.table).await?;
    info!("Dropped table '{}' for {}", path.table, tenant.display_id());
    Ok(Json(json!({ "message": format!("Table {} dropped", path.table) })))
}
