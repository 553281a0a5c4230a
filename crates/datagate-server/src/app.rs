//! Application assembly
//!
//! Builds the shared state and the full HTTP router from a loaded
//! configuration and tenant registry.

use axum::{Router, extract::DefaultBodyLimit, http::StatusCode, middleware::from_fn};
use std::{sync::Arc, time::Duration};
use tower_http::timeout::TimeoutLayer;

use datagate_core::{TenantRegistry, TenantToken};
use datagate_ingress::{GatewaySettings, GatewayState, middleware::request_context_middleware};
use datagate_observability::{HealthState, Metrics, health_router};
use datagate_pool::{PoolManager, PoolReadiness};

use crate::config::ServerConfig;

pub fn gateway_settings(config: &ServerConfig) -> datagate_core::Result<GatewaySettings> {
    let default_token = config
        .default_token
        .as_deref()
        .map(TenantToken::new)
        .transpose()?;

    Ok(GatewaySettings {
        mount_prefix: config.mount_prefix.clone(),
        max_page_limit: config.max_page_limit,
        default_token,
    })
}

/// Tenant routes plus the health endpoints, wrapped in the request-wide layers
pub fn build_app(
    config: &ServerConfig,
    registry: Arc<TenantRegistry>,
    pools: Arc<PoolManager>,
    metrics: Arc<Metrics>,
) -> datagate_core::Result<Router> {
    let state = GatewayState::new(registry.clone(), pools.clone(), gateway_settings(config)?)?
        .with_metrics(metrics.clone());

    let readiness = Arc::new(PoolReadiness::new(pools, registry));
    let health = health_router(HealthState::with_readiness_checker(metrics, readiness));

    Ok(health
        .merge(datagate_ingress::router(Arc::new(state)))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(from_fn(request_context_middleware))
        .layer(request_timeout(config.request_timeout_secs)))
}

/// Requests running past the deadline are answered with 408
fn request_timeout(secs: u64) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(secs))
}
