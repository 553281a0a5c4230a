//! Shared ingress middleware

use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::{sync::Arc, time::Instant};
use tracing::{Instrument, info_span};

use datagate_core::TenantContext;

use crate::{state::GatewayState, types::RequestId};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Attach a request ID (honoring an incoming `x-request-id`) and run the
/// request inside a span carrying it
pub async fn request_context_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| RequestId::from_string(v.to_string()))
        .unwrap_or_else(RequestId::generate);

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    req.extensions_mut().insert(request_id.clone());
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

/// Operation label for a matched route template with the mount prefix removed
pub fn operation_label(method: &Method, template: &str) -> &'static str {
    let segments: Vec<&str> = template.trim_start_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("GET", [_, "tables"]) => "list_collections",
        ("POST", [_, "query"]) => "execute_sql",
        ("DELETE", [_, "drop", _]) => "drop_collection",
        ("GET", [_, _]) => "list_all",
        ("POST", [_, _]) => "insert",
        ("POST", [_, _, "query"]) => "query",
        ("POST", [_, _, "count"]) => "count",
        ("POST", [_, _, "search"]) => "search",
        ("GET", [_, _, _]) => "get_by_id",
        ("PUT", [_, _, _]) => "update",
        ("DELETE", [_, _, _]) => "remove",
        ("POST", [_, _, _, _]) => "mutate_array",
        _ => "other",
    }
}

/// Record request count and latency per backend and operation
pub async fn track_metrics(
    State(state): State<Arc<GatewayState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(metrics) = state.metrics.clone() else {
        return next.run(req).await;
    };

    let backend = req
        .extensions()
        .get::<TenantContext>()
        .map(|t| t.backend().as_str())
        .unwrap_or("unknown");
    let template = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();
    let relative = template
        .strip_prefix(state.settings.mount_prefix.as_str())
        .unwrap_or(&template);
    let operation = operation_label(req.method(), relative);

    let start = Instant::now();
    let response = next.run(req).await;
    metrics.record_request(
        backend,
        operation,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
