//! Readiness reporting over the pool manager

use std::sync::Arc;

use datagate_core::TenantRegistry;
use datagate_observability::{ReadinessChecker, TenantStatus};

use crate::manager::{ConnectionState, PoolManager};

/// Reports not-ready while any tenant is marked unavailable. Tenants that
/// have not connected yet count as ready.
pub struct PoolReadiness {
    pools: Arc<PoolManager>,
    registry: Arc<TenantRegistry>,
}

impl PoolReadiness {
    pub fn new(pools: Arc<PoolManager>, registry: Arc<TenantRegistry>) -> Self {
        Self { pools, registry }
    }
}

impl ReadinessChecker for PoolReadiness {
    fn is_ready(&self) -> bool {
        self.registry
            .iter()
            .all(|t| self.pools.state(t.token.as_str()) != ConnectionState::Unavailable)
    }

    fn tenant_statuses(&self) -> Vec<TenantStatus> {
        self.pools.statuses(&self.registry)
    }
}
