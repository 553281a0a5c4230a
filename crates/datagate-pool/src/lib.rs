//! Per-tenant connection pool manager
//!
//! Backend handles are created lazily on first use (or eagerly at boot)
//! and cached for the life of the process. Creation is single-flight:
//! concurrent first requests for a tenant share one connect.

pub mod manager;
pub mod readiness;

pub use manager::{ConnectionState, PoolManager};
pub use readiness::PoolReadiness;
