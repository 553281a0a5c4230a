//! DataGate Observability
//!
//! This crate provides observability features:
//! - Metrics collection (Prometheus)
//! - Health endpoints with per-tenant connection status

pub mod health;
pub mod metrics;

pub use health::{HealthState, ReadinessChecker, TenantStatus, health_router};
pub use metrics::Metrics;
