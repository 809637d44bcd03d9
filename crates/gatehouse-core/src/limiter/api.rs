//! Flow Limiter API
//!
//! The seam between the admission layer and the engine deciding per-resource
//! admission. The admission layer only installs rules and consumes decisions.

use std::sync::Arc;

use gatehouse_types::rules::FlowRule;

use super::error::FlowBlocked;
use crate::prelude::*;

/// An admitted request. Dropping the entry releases it, so the release also
/// happens when the downstream handler errors, is cancelled, or panics.
#[must_use = "dropping the entry releases it immediately"]
pub struct FlowEntry {
	resource: Arc<str>,
	on_exit: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl FlowEntry {
	pub fn new(resource: impl Into<Arc<str>>) -> Self {
		Self { resource: resource.into(), on_exit: None }
	}

	/// Attach a release hook run exactly once when the entry ends
	pub fn on_exit(mut self, f: impl FnOnce() + Send + Sync + 'static) -> Self {
		self.on_exit = Some(Box::new(f));
		self
	}

	pub fn resource(&self) -> &str {
		&self.resource
	}

	/// Release explicitly
	pub fn exit(self) {}
}

impl Drop for FlowEntry {
	fn drop(&mut self) {
		if let Some(f) = self.on_exit.take() {
			f();
		}
	}
}

impl std::fmt::Debug for FlowEntry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FlowEntry").field("resource", &self.resource).finish()
	}
}

/// Statistics about the limiter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowLimiterStats {
	/// Number of resources with an installed rule
	pub rules: usize,
	/// Total admitted entries
	pub passed: u64,
	/// Total rejected entries
	pub blocked: u64,
	/// Entries admitted but not yet released
	pub in_flight: u64,
}

pub trait FlowLimiter: Send + Sync {
	/// Install `rules` as the complete rule set. Resources absent from
	/// `rules` lose their rule and are no longer limited. Returns whether the
	/// installed set changed. Invalid input leaves the previous set active.
	fn load_rules(&self, rules: &[FlowRule]) -> ClResult<bool>;

	/// Ask for admission of one request to `resource`
	fn entry(&self, resource: &str) -> Result<FlowEntry, FlowBlocked>;

	/// The currently installed rules, sorted by resource
	fn rules(&self) -> Vec<FlowRule>;

	fn stats(&self) -> FlowLimiterStats;
}

/// Check a rule set before it is installed
pub fn validate_rules(rules: &[FlowRule]) -> ClResult<()> {
	for rule in rules {
		if rule.resource.is_empty() {
			return Err(Error::InvalidRule("empty resource name".into()));
		}
		if !rule.threshold.is_finite() || rule.threshold < 0.0 {
			return Err(Error::InvalidRule(format!(
				"threshold {} for {} must be a finite, non-negative number",
				rule.threshold, rule.resource
			)));
		}
	}
	Ok(())
}


// vim: ts=4
