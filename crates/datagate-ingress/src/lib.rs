//! DataGate Ingress
//!
//! HTTP surface of the gateway:
//! - tenant resolution from the first path segment under the mount prefix
//! - generic CRUD routes over any backend
//! - the paged query protocol, count/search passthroughs and the relational
//!   SQL passthrough

pub mod auth;
pub mod crud;
pub mod envelope;
pub mod middleware;
pub mod query;
pub mod state;
pub mod types;

use axum::{
    Json, Router,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;
use std::sync::Arc;
use tower::Layer;

pub use state::{GatewaySettings, GatewayState};
pub use types::{ApiError, ApiResult, RequestId};

async fn route_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Route not found" })),
    )
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "message": "Method not allowed" })),
    )
}

/// Tenant routes, wrapped by the tenant resolver.
///
/// The resolver runs before routing so an empty token segment can be
/// rewritten to the default tenant. Unmatched paths, including those outside
/// the mount prefix, get a `{message}` 404; known paths with the wrong
/// method get a `{message}` 405.
pub fn router(state: Arc<GatewayState>) -> Router {
    let p = state.settings.mount_prefix.clone();

    let tenant_routes = Router::new()
        .route(&format!("{p}/{{token}}/tables"), get(query::list_tables))
        .route(&format!("{p}/{{token}}/query"), post(query::execute_sql))
        .route(&format!("{p}/{{token}}/drop/{{table}}"), delete(query::drop_table))
        .route(
            &format!("{p}/{{token}}/{{collection}}"),
            get(crud::list_all).post(crud::insert),
        )
        .route(&format!("{p}/{{token}}/{{collection}}/query"), post(query::query))
        .route(&format!("{p}/{{token}}/{{collection}}/count"), post(query::count))
        .route(&format!("{p}/{{token}}/{{collection}}/search"), post(query::search))
        .route(
            &format!("{p}/{{token}}/{{collection}}/{{id}}"),
            get(crud::get_by_id).put(crud::update).delete(crud::remove),
        )
        .route(
            &format!("{p}/{{token}}/{{collection}}/{{id}}/{{array_field}}"),
            post(crud::mutate_array),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::track_metrics))
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state.clone());

    let resolved = from_fn_with_state(state, auth::tenant_auth).layer(tenant_routes);
    Router::new().fallback_service(resolved)
}
