//! Connector creating MySQL pools from tenant descriptors

use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use datagate_core::{Backend, BackendKind, Connector, Error, Result, TenantDescriptor};

use crate::{backend::MySqlBackend, config::MySqlConfig};

#[derive(Debug, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    async fn connect(&self, tenant: &TenantDescriptor) -> Result<Arc<dyn Backend>> {
        let config = MySqlConfig::from_tenant(tenant)?;
        let options = config.connect_options()?;

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?;

        info!(
            "MySQL tenant '{}' connected (max {} connections)",
            tenant.display_id, config.max_connections
        );
        Ok(Arc::new(MySqlBackend::new(pool, config.allow_raw_sql)))
    }
}
