//! Flow control rejection

/// A request was rejected by the flow limiter
#[derive(Debug, Clone, PartialEq)]
pub struct FlowBlocked {
	/// Resource the request was counted against
	pub resource: Box<str>,
	/// Effective threshold of the rule that rejected it
	pub threshold: f64,
}

impl std::fmt::Display for FlowBlocked {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "flow control blocked {} (threshold {}/s)", self.resource, self.threshold)
	}
}

impl std::error::Error for FlowBlocked {}

// vim: ts=4
