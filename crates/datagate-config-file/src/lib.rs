//! File-based tenant source for DataGate
//!
//! Loads tenant descriptors from a YAML, TOML or JSON file.

mod file_source;

pub use file_source::FileTenantSource;
