//! File-based TenantSource implementation

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use datagate_core::{Error, Result, TenantDescriptor, registry::TenantSource};

/// Tenant file layouts
///
/// - a bare list of descriptors
/// - a map of name to descriptor (keys are informational only)
/// - either of the above under a top-level `tenants` key, which is the only
///   form TOML can express
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TenantFile {
    Wrapped { tenants: TenantList },
    Bare(TenantList),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TenantList {
    List(Vec<TenantDescriptor>),
    Map(BTreeMap<String, TenantDescriptor>),
}

impl TenantFile {
    fn into_descriptors(self) -> Vec<TenantDescriptor> {
        let list = match self {
            TenantFile::Wrapped { tenants } => tenants,
            TenantFile::Bare(tenants) => tenants,
        };
        match list {
            TenantList::List(tenants) => tenants,
            TenantList::Map(tenants) => tenants.into_values().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Toml,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Format::Toml,
            Some("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

/// Tenant source backed by a file on disk
///
/// The file is read on every `load`; the registry itself is built once at
/// boot, so in practice that is a single read.
#[derive(Debug, Clone)]
pub struct FileTenantSource {
    path: PathBuf,
}

impl FileTenantSource {
    /// Create a source for the given path, expanding `~` and environment
    /// variables
    ///
    /// # Errors
    /// - `Error::Config` if the path cannot be expanded or does not exist
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let raw = path.as_ref();
        let expanded = shellexpand::full(raw)
            .map_err(|e| Error::Config(format!("Invalid tenants path '{}': {}", raw, e)))?;
        let path = PathBuf::from(expanded.as_ref());

        if !path.exists() {
            return Err(Error::Config(format!(
                "Tenants file not found: {}",
                path.display()
            )));
        }

        info!("Using tenants file {:?}", path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, contents: &str) -> Result<Vec<TenantDescriptor>> {
        let file: TenantFile = match Format::from_path(&self.path) {
            Format::Toml => toml::from_str(contents).map_err(|e| {
                error!("Failed to parse TOML tenants file: {}", e);
                Error::Config(format!("Invalid TOML: {}", e))
            })?,
            Format::Json => serde_json::from_str(contents).map_err(|e| {
                error!("Failed to parse JSON tenants file: {}", e);
                Error::Config(format!("Invalid JSON: {}", e))
            })?,
            Format::Yaml => serde_yaml::from_str(contents).map_err(|e| {
                error!("Failed to parse YAML tenants file: {}", e);
                Error::Config(format!("Invalid YAML: {}", e))
            })?,
        };
        Ok(file.into_descriptors())
    }
}

#[async_trait]
impl TenantSource for FileTenantSource {
    async fn load(&self) -> Result<Vec<TenantDescriptor>> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            error!("Failed to read tenants file: {}", e);
            Error::Config(format!(
                "Failed to read tenants file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let tenants = self.parse(&contents)?;
        debug!("Read {} tenant descriptors from {:?}", tenants.len(), self.path);
        Ok(tenants)
    }
}
