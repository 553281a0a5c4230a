use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {name}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_mount_prefix")]
    pub mount_prefix: String,

    #[serde(default = "default_tenants_file")]
    pub tenants_file: String,

    /// Tenant served when the token segment is empty
    #[serde(default)]
    pub default_token: Option<String>,

    /// Connect every tenant at boot instead of on first request
    #[serde(default)]
    pub eager_connect: bool,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_sql_queries: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mount_prefix: default_mount_prefix(),
            tenants_file: default_tenants_file(),
            default_token: None,
            eager_connect: false,
            request_timeout_secs: default_request_timeout_secs(),
            max_page_limit: default_max_page_limit(),
            max_body_bytes: default_max_body_bytes(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_sql_queries: false,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) -> Result<(), ServerConfigError> {
        if let Ok(val) = std::env::var("DATAGATE_HOST") {
            self.host = val;
        }

        // `PORT` is honored for platform deployments; the prefixed name wins
        for name in ["PORT", "DATAGATE_PORT"] {
            if let Ok(val) = std::env::var(name) {
                self.port = val
                    .parse()
                    .map_err(|_| ServerConfigError::InvalidEnv { name, value: val })?;
            }
        }

        if let Ok(val) = std::env::var("DATAGATE_MOUNT_PREFIX") {
            self.mount_prefix = val;
        }

        if let Ok(val) = std::env::var("DATAGATE_TENANTS_FILE") {
            self.tenants_file = val;
        }

        if let Ok(val) = std::env::var("DATAGATE_DEFAULT_TOKEN") {
            self.default_token = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var("DATAGATE_EAGER_CONNECT") {
            self.eager_connect = val.parse().map_err(|_| ServerConfigError::InvalidEnv {
                name: "DATAGATE_EAGER_CONNECT",
                value: val,
            })?;
        }

        if let Ok(val) = std::env::var("DATAGATE_LOG_LEVEL") {
            self.logging.level = val;
        }

        Ok(())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_mount_prefix() -> String {
    "/api".to_string()
}

fn default_tenants_file() -> String {
    "./tenants.yaml".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_page_limit() -> u64 {
    1000
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}
