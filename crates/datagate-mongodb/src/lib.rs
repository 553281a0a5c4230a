//! MongoDB backend for DataGate
//!
//! Implements the generic CRUD contract over the official `mongodb` driver.
//! Filters are forwarded as MongoDB Extended JSON; results are flattened to
//! plain JSON (ObjectId as hex, DateTime as RFC 3339).

pub mod backend;
pub mod codec;
pub mod config;
pub mod connector;

pub use backend::MongoBackend;
pub use config::MongoConfig;
pub use connector::MongoConnector;
