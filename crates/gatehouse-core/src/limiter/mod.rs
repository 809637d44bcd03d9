//! Flow Control
//!
//! Per-resource request admission with fixed one-second windows. The
//! [`FlowLimiter`] trait is the seam the admission layer talks to;
//! [`WindowFlowLimiter`] is the built-in engine.

mod api;
mod engine;
mod error;

pub use api::{FlowEntry, FlowLimiter, FlowLimiterStats, validate_rules};
pub use engine::WindowFlowLimiter;
pub use error::FlowBlocked;

// vim: ts=4
