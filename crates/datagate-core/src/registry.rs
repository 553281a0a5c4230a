//! Tenant registry and the data source it is loaded from
//!
//! The registry is built once before serving starts and is read-only
//! afterwards. Descriptors live in an arena (`Vec`) and are looked up
//! through a token index, so adding tenants only requires rebuilding the
//! registry, never regenerating routes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    AuthError, Error, Result,
    tenant::TenantDescriptor,
};

/// Source of tenant descriptors
///
/// Implementations:
/// - `FileTenantSource`: YAML/TOML/JSON file on disk
#[async_trait]
pub trait TenantSource: Send + Sync {
    /// Load every tenant descriptor, in source order
    ///
    /// # Errors
    /// - `Error::Config` if the source is unreadable or malformed
    async fn load(&self) -> Result<Vec<TenantDescriptor>>;
}

/// Immutable set of tenants keyed by token
#[derive(Debug)]
pub struct TenantRegistry {
    tenants: Vec<Arc<TenantDescriptor>>,
    index: HashMap<String, usize>,
}

impl TenantRegistry {
    /// Build a registry, rejecting duplicate tokens and empty sets
    pub fn from_descriptors(descriptors: Vec<TenantDescriptor>) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(Error::Config("No tenants registered".to_string()));
        }

        let mut tenants = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if index.contains_key(descriptor.token.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate tenant token for '{}'",
                    descriptor.display_id
                )));
            }
            index.insert(descriptor.token.to_string(), tenants.len());
            tenants.push(Arc::new(descriptor));
        }

        Ok(Self { tenants, index })
    }

    /// Load a registry from a tenant source
    pub async fn load(source: &dyn TenantSource) -> Result<Self> {
        let descriptors = source.load().await?;
        let registry = Self::from_descriptors(descriptors)?;
        tracing::info!("Loaded {} tenants", registry.len());
        Ok(registry)
    }

    /// Resolve a token to its descriptor
    ///
    /// # Errors
    /// - `AuthError::Invalid` if the token is not registered
    pub fn lookup(&self, token: &str) -> Result<Arc<TenantDescriptor>> {
        self.index
            .get(token)
            .map(|i| self.tenants[*i].clone())
            .ok_or(Error::Auth(AuthError::Invalid))
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    /// Iterate tenants in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TenantDescriptor>> {
        self.tenants.iter()
    }
}
