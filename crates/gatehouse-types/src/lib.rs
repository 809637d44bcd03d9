//! Shared types, adapter traits, and error types for the Gatehouse admission layer.
//!
//! Adapter crates depend only on this crate, so they can be built without
//! pulling in the middleware and the server.

pub mod config_adapter;
pub mod discovery_adapter;
pub mod error;
pub mod prelude;
pub mod rules;

// vim: ts=4
