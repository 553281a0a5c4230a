//! Connection Pool Manager
//!
//! Holds one slot per tenant token. A slot is a `OnceCell` so the first
//! caller runs the connect and every concurrent caller awaits the same
//! future. The outcome is cached either way:
//! - success: the handle is reused for the life of the process
//! - failure: the tenant is marked unavailable and later requests fail fast
//!   with `BackendUnavailable`, without retrying

use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use datagate_core::{
    Backend, BackendKind, Connector, Error, Result, TenantDescriptor, TenantRegistry,
};
use datagate_observability::{Metrics, TenantStatus};

type Slot = Arc<OnceCell<std::result::Result<Arc<dyn Backend>, String>>>;

/// Connection state of a tenant as seen by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connect has completed yet
    Pending,
    Connected,
    /// The first connect failed; the tenant stays unavailable
    Unavailable,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Pending => "pending",
            ConnectionState::Connected => "connected",
            ConnectionState::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct PoolManager {
    connectors: HashMap<BackendKind, Arc<dyn Connector>>,
    slots: DashMap<String, Slot>,
    metrics: Option<Arc<Metrics>>,
}

impl PoolManager {
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
            slots: DashMap::new(),
            metrics: None,
        }
    }

    /// Register the connector for its backend kind, replacing any previous one
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connectors.insert(connector.kind(), connector);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Get the tenant's handle, connecting on first use
    ///
    /// # Errors
    /// - `Error::Config` if no connector handles the tenant's backend kind
    /// - `Error::BackendUnavailable` if the first connect failed, now or earlier
    pub async fn get_connection(&self, tenant: &TenantDescriptor) -> Result<Arc<dyn Backend>> {
        let connector = self.connectors.get(&tenant.backend).ok_or_else(|| {
            Error::Config(format!(
                "No connector registered for backend '{}'",
                tenant.backend
            ))
        })?;

        let slot = self
            .slots
            .entry(tenant.token.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let outcome = slot
            .get_or_init(|| async {
                debug!(
                    "Connecting tenant '{}' ({})",
                    tenant.display_id, tenant.backend
                );
                match connector.connect(tenant).await {
                    Ok(handle) => {
                        info!(
                            "Connected tenant '{}' to {} backend",
                            tenant.display_id, tenant.backend
                        );
                        if let Some(metrics) = &self.metrics {
                            metrics.record_connection_established(tenant.backend.as_str());
                        }
                        Ok(handle)
                    }
                    Err(err) => {
                        warn!(
                            "Connection failed for tenant '{}' ({}): {}",
                            tenant.display_id, tenant.backend, err
                        );
                        if let Some(metrics) = &self.metrics {
                            metrics.record_connection_failure(tenant.backend.as_str());
                        }
                        Err(match err {
                            Error::BackendUnavailable(message) => message,
                            other => other.to_string(),
                        })
                    }
                }
            })
            .await;

        match outcome {
            Ok(handle) => Ok(handle.clone()),
            Err(message) => Err(Error::BackendUnavailable(message.clone())),
        }
    }

    pub fn state(&self, token: &str) -> ConnectionState {
        match self.slots.get(token).and_then(|slot| slot.get().cloned()) {
            Some(Ok(_)) => ConnectionState::Connected,
            Some(Err(_)) => ConnectionState::Unavailable,
            None => ConnectionState::Pending,
        }
    }

    /// Connect every registered tenant. Failures are logged and cached, never
    /// propagated.
    pub async fn warm_up(&self, registry: &TenantRegistry) {
        let attempts = registry.iter().map(|tenant| async move {
            (tenant, self.get_connection(tenant).await)
        });
        let results = futures::future::join_all(attempts).await;

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        for (tenant, result) in &results {
            if let Err(err) = result {
                warn!("Warm-up failed for tenant '{}': {}", tenant.display_id, err);
            }
        }
        info!(
            "Warm-up finished: {} connected, {} unavailable",
            results.len() - failed,
            failed
        );
    }

    /// Status of every registered tenant, in registration order
    pub fn statuses(&self, registry: &TenantRegistry) -> Vec<TenantStatus> {
        registry
            .iter()
            .map(|tenant| TenantStatus {
                name: tenant.display_id.clone(),
                backend: tenant.backend.as_str().to_string(),
                status: self.state(tenant.token.as_str()).to_string(),
            })
            .collect()
    }

    /// Close every established handle
    pub async fn shutdown(&self) {
        let handles: Vec<(String, Arc<dyn Backend>)> = self
            .slots
            .iter()
            .filter_map(|entry| match entry.value().get() {
                Some(Ok(handle)) => Some((entry.key().clone(), handle.clone())),
                _ => None,
            })
            .collect();

        for (token, handle) in &handles {
            debug!("Closing backend handle for token {}", token);
            handle.close().await;
        }
        info!("Closed {} backend handles", handles.len());
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new()
    }
}
