//! Tenant types and context for multi-tenancy support

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::{Error, Result};

/// Opaque token identifying a tenant.
///
/// Tokens are unique across the registry and never change for the
/// lifetime of a tenant. They appear as the first path segment of every
/// tenant route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantToken(String);

impl TenantToken {
    /// Create a token, rejecting empty values and values that cannot
    /// appear as a single path segment
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::Config("Tenant token must not be empty".to_string()));
        }
        if token.contains('/') || token.chars().any(char::is_whitespace) {
            return Err(Error::Config(format!(
                "Tenant token '{}' must be a single path segment",
                token
            )));
        }
        Ok(Self(token))
    }

    /// Get the string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TenantToken {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TenantToken> for String {
    fn from(token: TenantToken) -> Self {
        token.0
    }
}

impl FromStr for TenantToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Category of data store a tenant is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "document", alias = "mongodb", alias = "mongo")]
    Document,
    #[serde(rename = "relational", alias = "mysql", alias = "mariadb")]
    Relational,
    #[serde(rename = "managedDocument", alias = "firestore")]
    ManagedDocument,
}

impl BackendKind {
    /// Wire name used in the `X-Client-Source` header and in metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Document => "document",
            BackendKind::Relational => "relational",
            BackendKind::ManagedDocument => "managedDocument",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered tenant: token, backend kind, display id and the
/// backend-specific connection parameters.
///
/// The connection descriptor is kept as raw JSON; each backend crate
/// deserializes it into its own typed configuration when connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantDescriptor {
    #[serde(alias = "clientToken")]
    pub token: TenantToken,

    #[serde(alias = "source")]
    pub backend: BackendKind,

    #[serde(alias = "clientId")]
    pub display_id: String,

    #[serde(default)]
    pub connection: serde_json::Value,
}

/// Request-scoped tenant context.
///
/// Inserted into request extensions by the tenant resolver. Handlers read
/// it instead of consulting any global tenant state.
#[derive(Debug, Clone)]
pub struct TenantContext {
    descriptor: Arc<TenantDescriptor>,
}

impl TenantContext {
    pub fn new(descriptor: Arc<TenantDescriptor>) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &Arc<TenantDescriptor> {
        &self.descriptor
    }

    pub fn token(&self) -> &TenantToken {
        &self.descriptor.token
    }

    pub fn backend(&self) -> BackendKind {
        self.descriptor.backend
    }

    pub fn display_id(&self) -> &str {
        &self.descriptor.display_id
    }
}
