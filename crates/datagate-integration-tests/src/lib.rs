//! End-to-end integration tests for DataGate
//!
//! The tests under `tests/` drive the full HTTP router (tenant resolution,
//! pool manager, handlers) over an in-memory backend defined in
//! `tests/common.rs`.
