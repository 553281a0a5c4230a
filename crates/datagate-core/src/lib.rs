//! DataGate Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout DataGate:
//! - Tenant descriptors, request context and the tenant registry
//! - The generic CRUD/query `Backend` contract and its `Connector`
//! - Query, paging and write-option types shared by every backend
//! - Core error types

pub mod backend;
pub mod clock;
pub mod error;
pub mod options;
pub mod query;
pub mod record;
pub mod registry;
pub mod tenant;

pub use backend::{Backend, Capabilities, Connector};
pub use error::{AuthError, Conflict, Error, NotFound, Result, ValidationError};
pub use record::Record;
pub use registry::{TenantRegistry, TenantSource};
pub use tenant::{BackendKind, TenantContext, TenantDescriptor, TenantToken};
