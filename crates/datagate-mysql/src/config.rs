//! MySQL connection descriptor

use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlConnectOptions;
use std::str::FromStr;

use datagate_core::{Error, Result, TenantDescriptor};

fn default_port() -> u16 {
    3306
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

/// Either `url` or the discrete `host`/`port`/`user`/`password`/`database`
/// fields, as accepted by the usual MySQL client libraries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MySqlConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, alias = "username")]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub database: Option<String>,

    /// Upper bound of pooled connections
    #[serde(default = "default_max_connections", alias = "connectionLimit")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Enables `POST /{token}/query`
    #[serde(default)]
    pub allow_raw_sql: bool,
}

impl MySqlConfig {
    /// Parse the tenant's connection descriptor
    pub fn from_tenant(tenant: &TenantDescriptor) -> Result<Self> {
        let config: MySqlConfig =
            serde_json::from_value(tenant.connection.clone()).map_err(|e| {
                Error::Config(format!(
                    "Invalid MySQL connection for tenant '{}': {}",
                    tenant.display_id, e
                ))
            })?;
        if config.url.is_none() && config.host.is_none() {
            return Err(Error::Config(format!(
                "MySQL connection for tenant '{}' needs a url or a host",
                tenant.display_id
            )));
        }
        if config.max_connections == 0 {
            return Err(Error::Config("maxConnections must be at least 1".to_string()));
        }
        Ok(config)
    }

    /// Driver connect options
    pub fn connect_options(&self) -> Result<MySqlConnectOptions> {
        if let Some(url) = &self.url {
            return MySqlConnectOptions::from_str(url)
                .map_err(|e| Error::Config(format!("Invalid MySQL url: {}", e)));
        }

        let mut options = MySqlConnectOptions::new().port(self.port);
        if let Some(host) = &self.host {
            options = options.host(host);
        }
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if let Some(database) = &self.database {
            options = options.database(database);
        }
        Ok(options)
    }
}
