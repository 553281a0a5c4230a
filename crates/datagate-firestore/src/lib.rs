//! Firestore backend for DataGate
//!
//! Talks to the Firestore REST API (v1) over a shared `reqwest` client.
//! Documents are exposed as `{id, ...fields}`; the native `where` filter of
//! a structured query is forwarded as is.

pub mod backend;
pub mod client;
pub mod config;
pub mod connector;
pub mod value;

pub use backend::FirestoreBackend;
pub use config::FirestoreConfig;
pub use connector::FirestoreConnector;
