//! Backend trait definitions
//!
//! Every data store adapter implements [`Backend`]. A [`Connector`] turns a
//! tenant descriptor into a live handle; the pool manager calls it at most
//! once per tenant.

use serde_json::Value;
use std::sync::Arc;

use crate::{
    Error, Record, Result,
    options::{ArrayMutation, InsertOptions, JoinSpec, UpdateOptions},
    query::{FindQuery, FindResult, Method, Operation, SqlQuery, SqlResult},
    tenant::{BackendKind, TenantDescriptor},
};

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// List every record in a collection, optionally narrowed by a native filter
    async fn list_all(&self, collection: &str, filter: Option<Value>) -> Result<Vec<Record>>;

    /// Fetch a single record
    ///
    /// # Errors
    /// - `NotFound::Document` if no record has this id
    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
        join: Option<&JoinSpec>,
    ) -> Result<Record>;

    /// Insert a record, stamping `createdAt`
    ///
    /// # Errors
    /// - `Conflict::DuplicateFields` listing every `uniqueFields` entry already taken
    async fn insert(&self, collection: &str, data: Record, options: &InsertOptions)
    -> Result<Record>;

    /// Update a record, stamping `updatedAt`
    ///
    /// # Errors
    /// - `NotFound::Record` if no record has this id
    /// - `Conflict::DuplicateUnique` if another record holds the `unique` value
    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Record,
        options: &UpdateOptions,
    ) -> Result<Record>;

    /// Delete a record
    ///
    /// # Errors
    /// - `NotFound::Record` if no record has this id
    async fn remove(&self, collection: &str, id: &str) -> Result<()>;

    /// Add, replace or remove an element of an array field
    async fn mutate_array(
        &self,
        collection: &str,
        id: &str,
        mutation: &ArrayMutation,
    ) -> Result<Record>;

    async fn count(&self, collection: &str, filter: Value) -> Result<u64>;

    /// Filtered, projected and windowed fetch with the unwindowed total
    async fn find(&self, collection: &str, query: &FindQuery) -> Result<FindResult>;

    /// Invoke a named low-level operation. Callers check
    /// [`Capabilities::allows`] first.
    async fn invoke(&self, collection: &str, operation: &Operation) -> Result<Value>;

    /// Names of the collections or tables visible to this tenant
    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let _ = name;
        Err(Error::unsupported("drop"))
    }

    /// Privileged raw statement passthrough
    async fn execute_sql(&self, query: &SqlQuery) -> Result<SqlResult> {
        let _ = query;
        Err(Error::unsupported("query"))
    }

    /// Release network resources held by the handle
    async fn close(&self) {}

    /// Get backend capabilities
    fn capabilities(&self) -> Capabilities;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Operations accepted by `invoke`
    pub methods: &'static [Method],
    pub supports_join: bool,
    pub supports_sql: bool,
    pub supports_drop: bool,
}

impl Capabilities {
    pub fn allows(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }

    /// Reject an operation outside the allow-list
    pub fn check(&self, operation: &Operation) -> Result<()> {
        let method = operation.method();
        if self.allows(method) {
            Ok(())
        } else {
            Err(Error::unsupported(method.as_str()))
        }
    }
}

/// Establishes backend handles for one backend kind
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Connect using the tenant's connection descriptor
    ///
    /// # Errors
    /// - `Error::Config` if the descriptor is malformed
    /// - `Error::BackendUnavailable` if the store cannot be reached
    async fn connect(&self, tenant: &TenantDescriptor) -> Result<Arc<dyn Backend>>;
}
