//! Admission metrics
//!
//! Every admission decision feeds the `metrics` facade, where an installed
//! Prometheus recorder turns it into counters and a latency histogram. The
//! request counters are also kept in-process for [`AdmissionMetrics::snapshot`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, histogram};
use parking_lot::RwLock;

pub const REQ_TOTAL: &str = "service_http_req_total";
pub const PASSED_TOTAL: &str = "service_http_passed_total";
pub const BLOCK_TOTAL: &str = "service_http_block_total";
pub const REQUEST_DURATION: &str = "service_http_request_duration_seconds";
pub const UPTIME: &str = "service_uptime";

/// Latency histogram bucket bounds in seconds
pub const DURATION_BUCKETS: [f64; 7] = [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];

/// Label triple of one observation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
	pub status: u16,
	pub endpoint: Box<str>,
	pub resource: Box<str>,
}

impl MetricKey {
	pub fn new(status: u16, endpoint: &str, resource: &str) -> Self {
		Self { status, endpoint: endpoint.into(), resource: resource.into() }
	}
}

#[derive(Default)]
struct Counters {
	requests: AtomicU64,
	passed: AtomicU64,
	blocked: AtomicU64,
	duration_micros: AtomicU64,
}

/// Point-in-time copy of the counters of one label triple
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
	pub requests: u64,
	pub passed: u64,
	pub blocked: u64,
	/// Summed latency of all observations
	pub duration_micros: u64,
}

/// Registry of admission counters keyed by `(status, endpoint, resource)`
#[derive(Default)]
pub struct AdmissionMetrics {
	counters: RwLock<HashMap<MetricKey, Arc<Counters>>>,
}

impl std::fmt::Debug for AdmissionMetrics {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AdmissionMetrics").field("series", &self.counters.read().len()).finish()
	}
}

impl AdmissionMetrics {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_pass(&self, status: u16, endpoint: &str, resource: &str, elapsed: Duration) {
		self.record(status, endpoint, resource, elapsed, true);
	}

	pub fn record_block(&self, status: u16, endpoint: &str, resource: &str, elapsed: Duration) {
		self.record(status, endpoint, resource, elapsed, false);
	}

	fn record(&self, status: u16, endpoint: &str, resource: &str, elapsed: Duration, passed: bool) {
		let key = MetricKey::new(status, endpoint, resource);
		let entry = self.counters.read().get(&key).cloned();
		let entry = match entry {
			Some(entry) => entry,
			None => self.counters.write().entry(key).or_default().clone(),
		};

		let secs = elapsed.as_secs_f64();
		entry.requests.fetch_add(1, Ordering::Relaxed);
		if passed {
			entry.passed.fetch_add(1, Ordering::Relaxed);
		} else {
			entry.blocked.fetch_add(1, Ordering::Relaxed);
		}
		let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
		entry.duration_micros.fetch_add(micros, Ordering::Relaxed);

		let status = status.to_string();
		let endpoint = endpoint.to_string();
		let resource = resource.to_string();
		counter!(REQ_TOTAL, "status" => status.clone(), "endpoint" => endpoint.clone(), "resource" => resource.clone()).increment(1);
		let outcome = if passed { PASSED_TOTAL } else { BLOCK_TOTAL };
		counter!(outcome, "status" => status.clone(), "endpoint" => endpoint.clone(), "resource" => resource.clone()).increment(1);
		histogram!(REQUEST_DURATION, "status" => status, "endpoint" => endpoint, "resource" => resource).record(secs);
	}

	/// Counters of one label triple, `None` if it was never observed
	pub fn get(&self, status: u16, endpoint: &str, resource: &str) -> Option<CounterSnapshot> {
		let key = MetricKey::new(status, endpoint, resource);
		self.counters.read().get(&key).map(|c| snapshot_of(c))
	}

	/// Copy of all counters, sorted by label triple
	pub fn snapshot(&self) -> Vec<(MetricKey, CounterSnapshot)> {
		let mut all: Vec<_> =
			self.counters.read().iter().map(|(k, c)| (k.clone(), snapshot_of(c))).collect();
		all.sort_by(|a, b| a.0.cmp(&b.0));
		all
	}

	/// Sum of blocked observations over all label triples
	pub fn total_blocked(&self) -> u64 {
		self.counters.read().values().map(|c| c.blocked.load(Ordering::Relaxed)).sum()
	}

	pub fn total_requests(&self) -> u64 {
		self.counters.read().values().map(|c| c.requests.load(Ordering::Relaxed)).sum()
	}
}

fn snapshot_of(c: &Counters) -> CounterSnapshot {
	CounterSnapshot {
		requests: c.requests.load(Ordering::Relaxed),
		passed: c.passed.load(Ordering::Relaxed),
		blocked: c.blocked.load(Ordering::Relaxed),
		duration_micros: c.duration_micros.load(Ordering::Relaxed),
	}
}


// vim: ts=4
