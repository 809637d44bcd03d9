//! Flow Limiter Engine
//!
//! Per-resource direct counting over fixed one-second windows. A rule with
//! threshold `t` admits `floor(t)` requests per window, all of which may
//! arrive as a burst; thresholds below one block every request. Windows are
//! aligned to the moment the rule was installed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use gatehouse_types::rules::FlowRule;

use super::api::{FlowEntry, FlowLimiter, FlowLimiterStats, validate_rules};
use super::error::FlowBlocked;
use crate::prelude::*;

/// Length of one counting window
pub const WINDOW: Duration = Duration::from_millis(1000);

struct Window {
	start: Instant,
	count: u64,
}

/// Installed rule with its window state
struct ResourceSlot {
	rule: FlowRule,
	/// Admissions per window
	limit: u64,
	window: Mutex<Window>,
	in_flight: Arc<AtomicU64>,
}

impl ResourceSlot {
	fn new(rule: FlowRule) -> Self {
		Self {
			limit: limit_for(rule.threshold),
			rule,
			window: Mutex::new(Window { start: Instant::now(), count: 0 }),
			in_flight: Arc::new(AtomicU64::new(0)),
		}
	}

	/// Count one request against the current window
	fn try_acquire(&self) -> bool {
		if self.limit == 0 {
			return false;
		}

		let now = Instant::now();
		let mut window = self.window.lock();
		let elapsed = now.saturating_duration_since(window.start);
		if elapsed >= WINDOW {
			let into = elapsed.as_nanos() % WINDOW.as_nanos();
			let into = Duration::from_nanos(u64::try_from(into).unwrap_or(0));
			window.start = now.checked_sub(into).unwrap_or(now);
			window.count = 0;
		}

		if window.count < self.limit {
			window.count += 1;
			true
		} else {
			false
		}
	}
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn limit_for(threshold: f64) -> u64 {
	// Saturating float to int conversion; thresholds are validated finite
	threshold.floor() as u64
}

/// Main flow limiter
pub struct WindowFlowLimiter {
	slots: RwLock<HashMap<Box<str>, Arc<ResourceSlot>>>,
	/// In-flight entries of resources without a rule
	unlimited_in_flight: Arc<AtomicU64>,
	total_passed: AtomicU64,
	total_blocked: AtomicU64,
}

impl WindowFlowLimiter {
	pub fn new() -> Self {
		Self {
			slots: RwLock::new(HashMap::new()),
			unlimited_in_flight: Arc::new(AtomicU64::new(0)),
			total_passed: AtomicU64::new(0),
			total_blocked: AtomicU64::new(0),
		}
	}

	fn admit(&self, resource: &str, in_flight: &Arc<AtomicU64>) -> FlowEntry {
		self.total_passed.fetch_add(1, Ordering::Relaxed);
		in_flight.fetch_add(1, Ordering::Relaxed);
		let in_flight = in_flight.clone();
		FlowEntry::new(resource).on_exit(move || {
			in_flight.fetch_sub(1, Ordering::Relaxed);
		})
	}
}

impl Default for WindowFlowLimiter {
	fn default() -> Self {
		Self::new()
	}
}

impl FlowLimiter for WindowFlowLimiter {
	fn load_rules(&self, rules: &[FlowRule]) -> ClResult<bool> {
		validate_rules(rules)?;

		// Later rules for the same resource overwrite earlier ones
		let mut wanted: HashMap<&str, &FlowRule> = HashMap::with_capacity(rules.len());
		for rule in rules {
			wanted.insert(&rule.resource, rule);
		}

		let mut slots = self.slots.write();
		let mut changed = slots.len() != wanted.len();
		let mut next = HashMap::with_capacity(wanted.len());
		for (resource, rule) in wanted {
			// Unchanged rules keep their window state
			match slots.get(resource) {
				Some(slot) if slot.rule == *rule => {
					next.insert(Box::from(resource), slot.clone());
				}
				_ => {
					changed = true;
					next.insert(Box::from(resource), Arc::new(ResourceSlot::new(rule.clone())));
				}
			}
		}
		*slots = next;
		drop(slots);

		if changed {
			info!("Loaded {} flow rules", rules.len());
		} else {
			debug!("Flow rules unchanged");
		}
		Ok(changed)
	}

	fn entry(&self, resource: &str) -> Result<FlowEntry, FlowBlocked> {
		let slot = self.slots.read().get(resource).cloned();
		let Some(slot) = slot else {
			return Ok(self.admit(resource, &self.unlimited_in_flight));
		};

		if slot.try_acquire() {
			Ok(self.admit(resource, &slot.in_flight))
		} else {
			self.total_blocked.fetch_add(1, Ordering::Relaxed);
			debug!("Flow control blocked {} (threshold {})", resource, slot.rule.threshold);
			Err(FlowBlocked { resource: resource.into(), threshold: slot.rule.threshold })
		}
	}

	fn rules(&self) -> Vec<FlowRule> {
		let mut rules: Vec<FlowRule> =
			self.slots.read().values().map(|slot| slot.rule.clone()).collect();
		rules.sort_by(|a, b| a.resource.cmp(&b.resource));
		rules
	}

	fn stats(&self) -> FlowLimiterStats {
		let slots = self.slots.read();
		let in_flight = slots.values().map(|s| s.in_flight.load(Ordering::Relaxed)).sum::<u64>()
			+ self.unlimited_in_flight.load(Ordering::Relaxed);
		FlowLimiterStats {
			rules: slots.len(),
			passed: self.total_passed.load(Ordering::Relaxed),
			blocked: self.total_blocked.load(Ordering::Relaxed),
			in_flight,
		}
	}
}


// vim: ts=4
