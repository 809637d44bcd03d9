//! Admission middleware
//!
//! Two tower layers placed in front of the handlers: [`IpFilterLayer`] gates
//! the guarded path by client address, then [`FlowControlLayer`] applies the
//! per-resource flow rules. Both record their decisions into one shared
//! [`AdmissionMetrics`](crate::metrics::AdmissionMetrics).

mod flow;
mod ip_gate;
mod reject;

pub use flow::{
	BlockFallback, FlowControlConfig, FlowControlLayer, FlowControlService, ResourceExtractor,
	method_route_resource,
};
pub use ip_gate::{IpFilterLayer, IpFilterService};
pub use reject::{AdmissionReject, THROTTLED_CODE, THROTTLED_MESSAGE};

// vim: ts=4
