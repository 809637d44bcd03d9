//! Gatehouse is an admission layer for HTTP services.
//!
//! # Features
//!
//! - IP filtering
//!     - allow and block lists with a default policy
//!     - per-resource authorized addresses on a guarded path
//! - Per-resource flow control with one-second windows
//! - Rules published in a config store and reloaded on change
//! - Service registration in a discovery backend
//!     - flow thresholds split across the active instances
//! - Prometheus metrics

// Re-export shared types and adapter traits from gatehouse-types
pub use gatehouse_types::config_adapter;
pub use gatehouse_types::discovery_adapter;
pub use gatehouse_types::error;
pub use gatehouse_types::rules;

// Re-export admission building blocks from gatehouse-core
pub use gatehouse_core::admission;
pub use gatehouse_core::extract;
pub use gatehouse_core::ip_filter;
pub use gatehouse_core::limiter;
pub use gatehouse_core::rebalance;
pub use gatehouse_core::watch;
pub use gatehouse_core::{AdmissionMetrics, RuleLoader, ServerMode};

// Local modules
pub mod app;
pub mod prelude;
pub mod routes;
pub mod webserver;

pub use app::{App, AppBuilder, AppOpts, AppState};

// vim: ts=4
