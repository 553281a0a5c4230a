//! Connector creating MongoDB handles from tenant descriptors

use async_trait::async_trait;
use mongodb::{Client, bson::doc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use datagate_core::{Backend, BackendKind, Connector, Error, Result, TenantDescriptor};

use crate::{backend::MongoBackend, config::MongoConfig};

/// Builds one client per tenant, or one client per URI for tenants that set
/// `shareClient`
#[derive(Default)]
pub struct MongoConnector {
    shared: Mutex<HashMap<String, Client>>,
}

impl MongoConnector {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client_for(&self, config: &MongoConfig) -> Result<Client> {
        if !config.share_client {
            return open_client(&config.uri).await;
        }

        let mut shared = self.shared.lock().await;
        if let Some(client) = shared.get(&config.uri) {
            debug!("Reusing shared MongoDB client");
            return Ok(client.clone());
        }
        let client = open_client(&config.uri).await?;
        shared.insert(config.uri.clone(), client.clone());
        Ok(client)
    }

    /// Shut down clients shared between tenants
    pub async fn shutdown_shared(&self) {
        let clients: Vec<Client> = self.shared.lock().await.drain().map(|(_, c)| c).collect();
        for client in clients {
            client.shutdown().await;
        }
    }
}

async fn open_client(uri: &str) -> Result<Client> {
    Client::with_uri_str(uri)
        .await
        .map_err(|e| Error::BackendUnavailable(format!("Invalid MongoDB connection: {}", e)))
}

#[async_trait]
impl Connector for MongoConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    async fn connect(&self, tenant: &TenantDescriptor) -> Result<Arc<dyn Backend>> {
        let config = MongoConfig::from_tenant(tenant)?;
        let client = self.client_for(&config).await?;

        let db = match &config.database {
            Some(name) => client.database(name),
            None => client.default_database().ok_or_else(|| {
                Error::Config(format!(
                    "MongoDB connection for tenant '{}' names no database",
                    tenant.display_id
                ))
            })?,
        };

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?;

        info!(
            "MongoDB tenant '{}' bound to database {}",
            tenant.display_id,
            db.name()
        );
        Ok(Arc::new(MongoBackend::new(client, db, config.share_client)))
    }
}
