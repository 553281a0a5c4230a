//! Connector creating Firestore handles from tenant descriptors

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::sync::Arc;
use tracing::info;

use datagate_core::{Backend, BackendKind, Connector, Error, Result, TenantDescriptor};

use crate::{
    backend::FirestoreBackend,
    client::{HttpClientConfig, create_client},
    config::FirestoreConfig,
};

/// One HTTP client shared by every Firestore tenant
pub struct FirestoreConnector {
    client: Client,
}

impl FirestoreConnector {
    pub fn new() -> Result<Self> {
        Self::with_client_config(&HttpClientConfig::default())
    }

    pub fn with_client_config(config: &HttpClientConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config)?,
        })
    }
}

#[async_trait]
impl Connector for FirestoreConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::ManagedDocument
    }

    async fn connect(&self, tenant: &TenantDescriptor) -> Result<Arc<dyn Backend>> {
        let config = FirestoreConfig::from_tenant(tenant)?;
        let root = Url::parse(&config.documents_root()?)
            .map_err(|e| Error::Config(format!("Invalid Firestore base url: {}", e)))?;
        let token = config.resolve_token()?;

        let backend = FirestoreBackend::new(self.client.clone(), root, token);

        // Probe credentials and reachability before the handle is cached
        backend.list_collections().await.map_err(|e| match e {
            Error::BackendUnavailable(msg) => Error::BackendUnavailable(msg),
            other => Error::BackendUnavailable(other.to_string()),
        })?;

        info!(
            "Firestore tenant '{}' bound to project {}",
            tenant.display_id,
            config.project().unwrap_or_default()
        );
        Ok(Arc::new(backend))
    }
}
