//! Firestore connection descriptor

use serde::{Deserialize, Serialize};

use datagate_core::{Error, Result, TenantDescriptor};

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

fn default_database() -> String {
    "(default)".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Service account key; only the project is read from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirestoreConfig {
    #[serde(default)]
    pub project_id: Option<String>,

    /// Service account key as shipped by the console (`connection.cert`)
    #[serde(default)]
    pub cert: Option<ServiceAccountKey>,

    #[serde(default = "default_database")]
    pub database: String,

    /// API root; point at an emulator with `http://localhost:8080/v1`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth2 bearer token
    #[serde(default)]
    pub access_token: Option<String>,

    /// Environment variable holding the bearer token
    #[serde(default)]
    pub access_token_env: Option<String>,
}

impl FirestoreConfig {
    /// Parse the tenant's connection descriptor
    pub fn from_tenant(tenant: &TenantDescriptor) -> Result<Self> {
        let config: FirestoreConfig =
            serde_json::from_value(tenant.connection.clone()).map_err(|e| {
                Error::Config(format!(
                    "Invalid Firestore connection for tenant '{}': {}",
                    tenant.display_id, e
                ))
            })?;
        if config.project().is_none() {
            return Err(Error::Config(format!(
                "Firestore connection for tenant '{}' names no project",
                tenant.display_id
            )));
        }
        Ok(config)
    }

    pub fn project(&self) -> Option<&str> {
        self.project_id
            .as_deref()
            .or_else(|| self.cert.as_ref().map(|c| c.project_id.as_str()))
            .filter(|p| !p.is_empty())
    }

    /// Bearer token, if any; emulators accept unauthenticated calls
    pub fn resolve_token(&self) -> Result<Option<String>> {
        if let Some(token) = &self.access_token {
            return Ok(Some(token.clone()));
        }
        match &self.access_token_env {
            Some(var) => std::env::var(var).map(Some).map_err(|_| {
                Error::Config(format!("Environment variable {} is not set", var))
            }),
            None => Ok(None),
        }
    }

    /// `{base}/projects/{p}/databases/{db}/documents`
    pub fn documents_root(&self) -> Result<String> {
        let project = self
            .project()
            .ok_or_else(|| Error::Config("Firestore project is not set".to_string()))?;
        Ok(format!(
            "{}/projects/{}/databases/{}/documents",
            self.base_url.trim_end_matches('/'),
            project,
            self.database
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datagate_core::{BackendKind, TenantToken};
    use serde_json::json;

    fn tenant(connection: serde_json::Value) -> TenantDescriptor {
        TenantDescriptor {
            token: TenantToken::new("t").unwrap(),
            backend: BackendKind::ManagedDocument,
            display_id: "mobile".to_string(),
            connection,
        }
    }

    #[test]
    fn test_project_from_cert() {
        let config = FirestoreConfig::from_tenant(&tenant(json!({
            "cert": {"project_id": "demo", "private_key": "ignored"}
        })))
        .unwrap();
        assert_eq!(config.project(), Some("demo"));
        assert_eq!(config.database, "(default)");
        assert_eq!(
            config.documents_root().unwrap(),
            "https://firestore.googleapis.com/v1/projects/demo/databases/(default)/documents"
        );
    }

    #[test]
    fn test_requires_project() {
        let result = FirestoreConfig::from_tenant(&tenant(json!({"database": "x"})));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_token_resolution() {
        let config = FirestoreConfig::from_tenant(&tenant(json!({
            "projectId": "demo",
            "accessToken": "abc"
        })))
        .unwrap();
        assert_eq!(config.resolve_token().unwrap().as_deref(), Some("abc"));

        let config = FirestoreConfig::from_tenant(&tenant(json!({
            "projectId": "demo",
            "accessTokenEnv": "DATAGATE_TEST_UNSET_FIRESTORE_TOKEN"
        })))
        .unwrap();
        assert!(config.resolve_token().is_err());
    }
}
