//! MySQL/MariaDB backend for DataGate
//!
//! Implements the generic CRUD contract over a bounded `sqlx` pool.
//!
//! # Features
//! - Table and column names validated against `information_schema` on every request
//! - Values always bound, never interpolated
//! - Equality-map filters (`null` as `IS NULL`, arrays as `IN`)
//! - Rows decoded to JSON with 64-bit integers as decimal strings
//! - Optional raw statement passthrough, off unless `allowRawSql` is set

pub mod backend;
pub mod config;
pub mod connector;
pub mod filter;
pub mod identifiers;
pub mod row;

pub use backend::MySqlBackend;
pub use config::MySqlConfig;
pub use connector::MySqlConnector;
