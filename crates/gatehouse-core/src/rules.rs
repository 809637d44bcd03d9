//! Rule Loader
//!
//! Owns the active [`RuleSet`] and pushes every change into the IP filter
//! handle and the flow limiter. Changes arrive from three places: the initial
//! document at boot, config store updates, and membership changes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use axum::body::Body;
use hyper::Request;
use parking_lot::Mutex;

use gatehouse_types::rules::{FlowRule, RuleSet};

use crate::extract::query_param;
use crate::ip_filter::IpFilter;
use crate::limiter::{FlowLimiter, validate_rules};
use crate::prelude::*;
use crate::rebalance::rebalance;

pub struct RuleLoader {
	active: ArcSwap<RuleSet>,
	filter: Arc<ArcSwap<IpFilter>>,
	limiter: Arc<dyn FlowLimiter>,
	/// Last known number of active instances, at least 1
	members: AtomicUsize,
	/// Serializes reloads so the limiter and filter never mix two documents
	update: Mutex<()>,
}

impl std::fmt::Debug for RuleLoader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RuleLoader")
			.field("active", &self.active.load_full())
			.field("members", &self.members.load(Ordering::Relaxed))
			.finish_non_exhaustive()
	}
}

impl RuleLoader {
	/// Loader with an empty rule set: no flow rules and a filter guarding
	/// nothing
	pub fn new(limiter: Arc<dyn FlowLimiter>) -> Self {
		Self {
			active: ArcSwap::from_pointee(RuleSet::default()),
			filter: Arc::new(ArcSwap::from_pointee(IpFilter::default())),
			limiter,
			members: AtomicUsize::new(1),
			update: Mutex::new(()),
		}
	}

	/// Install `rules` in the limiter as the complete flow rule set. Invalid
	/// input is rejected as a whole and the previous rules stay active.
	///
	/// The active document is not modified, so the next document or membership
	/// change replaces these rules.
	pub fn load_rules(&self, rules: &[FlowRule]) -> ClResult<()> {
		validate_rules(rules)?;
		let _guard = self.update.lock();
		self.limiter.load_rules(rules)?;
		Ok(())
	}

	/// Decode a rule document and make it active. A document that fails to
	/// decode or validate leaves the previous rules in force.
	pub fn apply_document(&self, doc: &str) -> ClResult<()> {
		let rule_set = RuleSet::decode(doc).inspect_err(|err| {
			warn!("Rejected rule document: {}", err);
		})?;
		self.apply_rule_set(rule_set)
	}

	pub fn apply_rule_set(&self, rule_set: RuleSet) -> ClResult<()> {
		let _guard = self.update.lock();
		let members = self.members();
		let scaled = rebalance(&rule_set, members).unwrap_or_else(|| rule_set.flow_rules.clone());
		if let Err(err) = self.limiter.load_rules(&scaled) {
			warn!("Rejected flow rules: {}", err);
			return Err(err);
		}

		self.filter.store(Arc::new(IpFilter::new(&rule_set.ip_filter)));
		info!(
			"Rule set active: {} flow rules over {} members, guarded path {:?}",
			rule_set.flow_rules.len(),
			members,
			rule_set.ip_filter.url_path
		);
		self.active.store(Arc::new(rule_set));
		Ok(())
	}

	/// React to a membership change with `members` active instances. Flow
	/// rules are rescaled from the active document; the IP filter is left
	/// alone. Returns whether the limiter rules changed.
	pub fn on_membership(&self, members: usize) -> ClResult<bool> {
		let _guard = self.update.lock();
		let active = self.active.load_full();
		let Some(scaled) = rebalance(&active, members) else {
			warn!("No active instances reported, keeping current thresholds");
			return Ok(false);
		};
		let changed = self.limiter.load_rules(&scaled)?;
		self.members.store(members, Ordering::Relaxed);
		if changed {
			info!("Rebalanced {} flow rules for {} members", scaled.len(), members);
		}
		Ok(changed)
	}

	pub fn active(&self) -> Arc<RuleSet> {
		self.active.load_full()
	}

	/// Shared handle read by the IP filter layer
	pub fn filter_handle(&self) -> Arc<ArcSwap<IpFilter>> {
		self.filter.clone()
	}

	pub fn limiter(&self) -> Arc<dyn FlowLimiter> {
		self.limiter.clone()
	}

	pub fn members(&self) -> usize {
		self.members.load(Ordering::Relaxed)
	}

	/// Resource extractor reading the query parameter named by the active
	/// document's `resource-param` on every request
	pub fn resource_param_extractor(
		self: &Arc<Self>,
	) -> impl Fn(&Request<Body>) -> String + Send + Sync + 'static {
		let loader = self.clone();
		move |req: &Request<Body>| query_param(req, &loader.active.load().resource_param)
	}
}


// vim: ts=4
