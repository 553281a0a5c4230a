//! MongoDB connection descriptor

use serde::{Deserialize, Serialize};

use datagate_core::{Error, Result, TenantDescriptor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoConfig {
    /// Connection string
    #[serde(alias = "URI")]
    pub uri: String,

    /// Logical database; defaults to the one named in the URI
    #[serde(default)]
    pub database: Option<String>,

    /// Share one driver client across tenants with the same URI
    #[serde(default)]
    pub share_client: bool,
}

impl MongoConfig {
    /// Parse the tenant's connection descriptor
    pub fn from_tenant(tenant: &TenantDescriptor) -> Result<Self> {
        let config: MongoConfig =
            serde_json::from_value(tenant.connection.clone()).map_err(|e| {
                Error::Config(format!(
                    "Invalid MongoDB connection for tenant '{}': {}",
                    tenant.display_id, e
                ))
            })?;
        if config.uri.is_empty() {
            return Err(Error::Config(format!(
                "MongoDB connection for tenant '{}' has an empty uri",
                tenant.display_id
            )));
        }
        Ok(config)
    }
}
