//! IP Filter
//!
//! Static allow/block lists plus per-resource authorized addresses.
//!
//! A filter is built once from [`FilterOptions`] and never mutated afterwards,
//! so it can be read from any number of request tasks without locking. Rule
//! reloads build a new filter and swap the shared pointer.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use gatehouse_types::rules::FilterOptions;

use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct IpFilter {
	allowed: HashSet<IpAddr>,
	blocked: HashSet<IpAddr>,
	authorized: HashMap<Box<str>, HashSet<IpAddr>>,
	default_allowed: bool,
	guarded_path: Box<str>,
	resource_param: Box<str>,
}

/// Strict address parsing. IPv4-mapped IPv6 addresses are folded into their
/// IPv4 form so both notations match the same entry.
fn parse_ip(ip: &str) -> Option<IpAddr> {
	ip.parse::<IpAddr>().ok().map(|addr| addr.to_canonical())
}

impl IpFilter {
	pub fn new(opts: &FilterOptions) -> Self {
		let mut filter = Self {
			allowed: HashSet::with_capacity(opts.allowed.len()),
			blocked: HashSet::with_capacity(opts.blocked.len()),
			authorized: HashMap::with_capacity(opts.authorized.len()),
			default_allowed: !opts.blocked_default,
			guarded_path: opts.url_path.clone(),
			resource_param: opts.url_param.clone(),
		};

		for ip in &opts.allowed {
			filter.allow_ip(ip);
		}
		for ip in &opts.blocked {
			filter.block_ip(ip);
		}
		for entry in &opts.authorized {
			for ip in &entry.ips {
				filter.authorize_ip(ip, &entry.resource);
			}
		}

		debug!(
			"IP filter built: {} allowed, {} blocked, {} authorized resources, default {}",
			filter.allowed.len(),
			filter.blocked.len(),
			filter.authorized.len(),
			if filter.default_allowed { "allow" } else { "block" }
		);
		filter
	}

	fn allow_ip(&mut self, ip: &str) -> bool {
		if let Some(addr) = parse_ip(ip) {
			self.allowed.insert(addr);
			true
		} else {
			debug!("Skipping malformed allowed IP {:?}", ip);
			false
		}
	}

	fn block_ip(&mut self, ip: &str) -> bool {
		if let Some(addr) = parse_ip(ip) {
			self.blocked.insert(addr);
			true
		} else {
			debug!("Skipping malformed blocked IP {:?}", ip);
			false
		}
	}

	fn authorize_ip(&mut self, ip: &str, resource: &str) -> bool {
		if resource.is_empty() {
			debug!("Skipping authorized IP {:?} without resource", ip);
			return false;
		}
		if let Some(addr) = parse_ip(ip) {
			self.authorized.entry(resource.into()).or_default().insert(addr);
			true
		} else {
			debug!("Skipping malformed authorized IP {:?} for {}", ip, resource);
			false
		}
	}

	/// Whether a client address may pass. Empty or unparseable input falls
	/// back to the default policy.
	pub fn allowed(&self, ip: &str) -> bool {
		match parse_ip(ip) {
			Some(addr) => self.allowed_addr(&addr),
			None => self.default_allowed,
		}
	}

	/// The allow list is consulted before the block list, so an address on
	/// both is allowed.
	pub fn allowed_addr(&self, addr: &IpAddr) -> bool {
		let addr = addr.to_canonical();
		if self.allowed.contains(&addr) {
			true
		} else if self.blocked.contains(&addr) {
			false
		} else {
			self.default_allowed
		}
	}

	/// Whether `ip` is registered for exactly `resource`
	pub fn authorized(&self, ip: &str, resource: &str) -> bool {
		if resource.is_empty() {
			return false;
		}
		parse_ip(ip).is_some_and(|addr| self.authorized_addr(&addr, resource))
	}

	pub fn authorized_addr(&self, addr: &IpAddr, resource: &str) -> bool {
		if resource.is_empty() {
			return false;
		}
		self.authorized.get(resource).is_some_and(|ips| ips.contains(&addr.to_canonical()))
	}

	pub fn default_allowed(&self) -> bool {
		self.default_allowed
	}

	pub fn guarded_path(&self) -> &str {
		&self.guarded_path
	}

	pub fn resource_param(&self) -> &str {
		&self.resource_param
	}

	/// Whether the filter applies to a request path. A filter without a
	/// guarded path guards nothing.
	pub fn guards(&self, path: &str) -> bool {
		!self.guarded_path.is_empty() && *self.guarded_path == *path
	}
}

impl Default for IpFilter {
	fn default() -> Self {
		Self::new(&FilterOptions::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use gatehouse_types::rules::Authorized;

	fn opts() -> FilterOptions {
		FilterOptions {
			allowed: vec!["10.0.0.1".into(), "10.0.0.3".into(), "2001:db8::1".into()],
			blocked: vec!["10.0.0.2".into(), "10.0.0.3".into()],
			url_path: "/q".into(),
			url_param: "cid".into(),
			authorized: vec![
				Authorized { resource: "alpha".into(), ips: vec!["10.0.0.1".into(), "10.0.0.5".into()] },
				Authorized { resource: "beta".into(), ips: vec!["10.0.0.6".into()] },
			],
			blocked_default: false,
		}
	}

	#[test]
	fn test_padded_entries_are_dropped() {
		let f = IpFilter::new(&FilterOptions {
			allowed: vec![" 10.0.0.7 ".into(), "10.0.0.8".into()],
			blocked_default: true,
			..opts()
		});
		assert!(!f.allowed("10.0.0.7"));
		assert!(f.allowed("10.0.0.8"));
		assert!(!f.allowed(" 10.0.0.8"));

		let f = IpFilter::new(&FilterOptions { blocked: vec!["10.0.0.9\n".into()], ..opts() });
		assert!(f.allowed("10.0.0.9"));
	}

	#[test]
	fn test_allow_list() {
		let f = IpFilter::new(&opts());
		assert!(f.allowed("10.0.0.1"));
		assert!(f.allowed("2001:db8::1"));
	}

	#[test]
	fn test_block_list() {
		let f = IpFilter::new(&opts());
		assert!(!f.allowed("10.0.0.2"));
	}

	#[test]
	fn test_allow_wins_over_block() {
		let f = IpFilter::new(&opts());
		assert!(f.allowed("10.0.0.3"));
	}

	#[test]
	fn test_unlisted_uses_default() {
		let f = IpFilter::new(&opts());
		assert!(f.allowed("192.168.1.1"));

		let f = IpFilter::new(&FilterOptions { blocked_default: true, ..opts() });
		assert!(!f.allowed("192.168.1.1"));
		assert!(f.allowed("10.0.0.1"));
		assert!(!f.allowed("10.0.0.2"));
	}

	#[test]
	fn test_empty_or_garbage_input_uses_default() {
		let f = IpFilter::new(&opts());
		assert!(f.allowed(""));
		assert!(f.allowed("not-an-ip"));

		let f = IpFilter::new(&FilterOptions { blocked_default: true, ..opts() });
		assert!(!f.allowed(""));
		assert!(!f.allowed("999.1.1.1"));
	}

	#[test]
	fn test_malformed_entries_are_dropped() {
		let f = IpFilter::new(&FilterOptions {
			allowed: vec!["10.0.0.256".into(), "bogus".into(), "10.0.0.7".into()],
			blocked: vec!["".into(), "10.0.0.8/24".into()],
			..FilterOptions::default()
		});
		assert_eq!(f.allowed.len(), 1);
		assert!(f.blocked.is_empty());
		assert!(f.allowed("10.0.0.7"));
	}

	#[test]
	fn test_ipv4_mapped_matches_ipv4_entry() {
		let f = IpFilter::new(&opts());
		assert!(!f.allowed("::ffff:10.0.0.2"));
		assert!(f.authorized("::ffff:10.0.0.5", "alpha"));
	}

	#[test]
	fn test_authorized() {
		let f = IpFilter::new(&opts());
		assert!(f.authorized("10.0.0.1", "alpha"));
		assert!(f.authorized("10.0.0.5", "alpha"));
		assert!(!f.authorized("10.0.0.6", "alpha"));
		assert!(f.authorized("10.0.0.6", "beta"));
		assert!(!f.authorized("10.0.0.1", "gamma"));
		assert!(!f.authorized("10.0.0.1", "ALPHA"));
	}

	#[test]
	fn test_authorized_empty_resource_is_false() {
		let f = IpFilter::new(&opts());
		for ip in ["10.0.0.1", "10.0.0.5", "", "junk"] {
			assert!(!f.authorized(ip, ""));
		}
	}

	#[test]
	fn test_authorized_entry_without_resource_is_dropped() {
		let f = IpFilter::new(&FilterOptions {
			authorized: vec![Authorized { resource: "".into(), ips: vec!["10.0.0.1".into()] }],
			..FilterOptions::default()
		});
		assert!(f.authorized.is_empty());
	}

	#[test]
	fn test_guards() {
		let f = IpFilter::new(&opts());
		assert!(f.guards("/q"));
		assert!(!f.guards("/q/"));
		assert!(!f.guards("/"));
		assert!(!IpFilter::default().guards(""));
		assert_eq!(f.resource_param(), "cid");
	}
}

// vim: ts=4
