//! Adapter that registers this service with a discovery backend and reports
//! membership changes of the service group.

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::pin::Pin;

use crate::prelude::*;

/// One service instance as known to the discovery backend
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServiceInstance {
	pub service: Box<str>,
	pub group: Box<str>,
	pub ip: Box<str>,
	pub port: u16,
	pub weight: f64,
	pub healthy: bool,
	pub enabled: bool,
	#[serde(default)]
	pub metadata: HashMap<Box<str>, Box<str>>,
}

impl ServiceInstance {
	pub fn new(service: &str, group: &str, ip: &str, port: u16) -> Self {
		Self {
			service: service.into(),
			group: group.into(),
			ip: ip.into(),
			port,
			weight: 10.0,
			healthy: true,
			enabled: true,
			metadata: HashMap::new(),
		}
	}

	/// Whether the instance takes traffic and so counts toward membership
	pub fn is_active(&self) -> bool {
		self.healthy && self.enabled
	}
}

/// Snapshot of the membership of a service after a change
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipEvent {
	pub service: Box<str>,
	pub instances: Vec<ServiceInstance>,
}

impl MembershipEvent {
	pub fn active_count(&self) -> usize {
		self.instances.iter().filter(|i| i.is_active()).count()
	}
}

#[async_trait]
pub trait DiscoveryAdapter: Debug + Send + Sync {
	/// Register an instance. Registering the same ip:port twice replaces it.
	async fn register(&self, instance: &ServiceInstance) -> ClResult<()>;

	/// Remove an instance. Unknown instances are an error.
	async fn deregister(&self, instance: &ServiceInstance) -> ClResult<()>;

	/// Current instances of a service
	async fn list(&self, service: &str, group: &str) -> ClResult<Vec<ServiceInstance>>;

	/// Subscribe to membership changes. The stream yields the current
	/// membership first, then one event per change.
	async fn subscribe(
		&self,
		service: &str,
		group: &str,
	) -> ClResult<Pin<Box<dyn Stream<Item = MembershipEvent> + Send>>>;
}

// vim: ts=4
