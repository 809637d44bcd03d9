//! Admission control for Gatehouse services.
//!
//! IP filtering and per-resource flow control as tower layers, together with
//! the rule loader that keeps both in sync with the rule documents published
//! in the config store and with the membership of the service.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod admission;
pub mod extract;
pub mod ip_filter;
pub mod limiter;
pub mod metrics;
pub mod prelude;
pub mod rebalance;
pub mod rules;
pub mod watch;

pub use admission::{AdmissionReject, FlowControlConfig, FlowControlLayer, IpFilterLayer};
pub use extract::ServerMode;
pub use ip_filter::IpFilter;
pub use limiter::{FlowLimiter, WindowFlowLimiter};
pub use crate::metrics::AdmissionMetrics;
pub use rules::RuleLoader;

// vim: ts=4
