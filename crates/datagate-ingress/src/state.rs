//! Shared gateway state

use std::sync::Arc;

use datagate_core::{Backend, Error, Result, TenantContext, TenantRegistry, TenantToken};
use datagate_observability::Metrics;
use datagate_pool::PoolManager;

pub const DEFAULT_MOUNT_PREFIX: &str = "/api";
pub const DEFAULT_MAX_PAGE_LIMIT: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Path under which tenant routes are mounted, normalized by
    /// [`normalize_prefix`]
    pub mount_prefix: String,
    pub max_page_limit: u64,
    /// Tenant used when the token segment is empty
    pub default_token: Option<TenantToken>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            mount_prefix: DEFAULT_MOUNT_PREFIX.to_string(),
            max_page_limit: DEFAULT_MAX_PAGE_LIMIT,
            default_token: None,
        }
    }
}

/// `/api`, `api/` and `/api/` all become `/api`; `/` becomes the empty prefix
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

pub struct GatewayState {
    pub registry: Arc<TenantRegistry>,
    pub pools: Arc<PoolManager>,
    pub metrics: Option<Arc<Metrics>>,
    pub settings: GatewaySettings,
}

impl GatewayState {
    /// # Errors
    /// - `Error::Config` if the default token is not registered
    pub fn new(
        registry: Arc<TenantRegistry>,
        pools: Arc<PoolManager>,
        mut settings: GatewaySettings,
    ) -> Result<Self> {
        settings.mount_prefix = normalize_prefix(&settings.mount_prefix);

        if let Some(token) = &settings.default_token
            && !registry.contains(token.as_str())
        {
            return Err(Error::Config(format!(
                "Default token '{}' is not a registered tenant",
                token
            )));
        }

        Ok(Self {
            registry,
            pools,
            metrics: None,
            settings,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Connection handle for the resolved tenant
    pub async fn backend(&self, tenant: &TenantContext) -> Result<Arc<dyn Backend>> {
        self.pools.get_connection(tenant.descriptor()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datagate_core::{BackendKind, TenantDescriptor};
    use serde_json::json;

    fn registry() -> Arc<TenantRegistry> {
        Arc::new(
            TenantRegistry::from_descriptors(vec![TenantDescriptor {
                token: TenantToken::new("tok-a").unwrap(),
                backend: BackendKind::Document,
                display_id: "a".to_string(),
                connection: json!({}),
            }])
            .unwrap(),
        )
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/api"), "/api");
        assert_eq!(normalize_prefix("api/"), "/api");
        assert_eq!(normalize_prefix("/v1/data/"), "/v1/data");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix(""), "");
    }

    #[test]
    fn test_default_token_must_be_registered() {
        let pools = Arc::new(PoolManager::new());
        let settings = GatewaySettings {
            default_token: Some(TenantToken::new("ghost").unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            GatewayState::new(registry(), pools.clone(), settings),
            Err(Error::Config(_))
        ));

        let settings = GatewaySettings {
            mount_prefix: "api/".to_string(),
            default_token: Some(TenantToken::new("tok-a").unwrap()),
            ..Default::default()
        };
        let state = GatewayState::new(registry(), pools, settings).unwrap();
        assert_eq!(state.settings.mount_prefix, "/api");
    }
}
