//! In-process service discovery.
//!
//! Keeps the registered instances of every `(service, group)` pair in memory
//! and broadcasts a full membership snapshot after each change. Suitable for
//! single-host deployments, tests and the demo server.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

mod error;

use async_trait::async_trait;
use futures_core::Stream;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::pin::Pin;
use tokio::sync::broadcast;

use gatehouse_types::discovery_adapter::{DiscoveryAdapter, MembershipEvent, ServiceInstance};
use gatehouse_types::prelude::*;

pub use error::Error as MemoryDiscoveryError;

type ServiceKey = (Box<str>, Box<str>);

/// Snapshot broadcast to subscribers
#[derive(Debug, Clone)]
struct Change {
	group: Box<str>,
	event: MembershipEvent,
}

#[derive(Debug)]
pub struct MemoryDiscoveryAdapter {
	services: RwLock<HashMap<ServiceKey, Vec<ServiceInstance>>>,
	change_tx: broadcast::Sender<Change>,
}

impl MemoryDiscoveryAdapter {
	pub fn new() -> Self {
		Self::with_capacity(256)
	}

	/// Adapter whose subscribers may fall `capacity` changes behind before
	/// they are resynchronized
	pub fn with_capacity(capacity: usize) -> Self {
		let (change_tx, _) = broadcast::channel(capacity.max(1));
		Self { services: RwLock::new(HashMap::new()), change_tx }
	}

	fn key(service: &str, group: &str) -> ServiceKey {
		(service.into(), group.into())
	}

	fn snapshot(&self, service: &str, group: &str) -> Vec<ServiceInstance> {
		self.services.read().get(&Self::key(service, group)).cloned().unwrap_or_default()
	}

	fn notify(&self, service: &str, group: &str, instances: Vec<ServiceInstance>) {
		let change = Change {
			group: group.into(),
			event: MembershipEvent { service: service.into(), instances },
		};
		// No receivers is not an error
		let _ = self.change_tx.send(change);
	}
}

impl Default for MemoryDiscoveryAdapter {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl DiscoveryAdapter for MemoryDiscoveryAdapter {
	async fn register(&self, instance: &ServiceInstance) -> ClResult<()> {
		if instance.service.is_empty() || instance.ip.is_empty() {
			return Err(MemoryDiscoveryError::InvalidInstance(format!(
				"{}@{}:{}",
				instance.service, instance.ip, instance.port
			))
			.into());
		}

		let instances = {
			let mut services = self.services.write();
			let list = services.entry(Self::key(&instance.service, &instance.group)).or_default();
			// Re-registering the same address replaces the previous entry
			list.retain(|i| !(i.ip == instance.ip && i.port == instance.port));
			list.push(instance.clone());
			list.clone()
		};
		info!(
			"Registered {}@{}:{} in {} ({} instances)",
			instance.service,
			instance.ip,
			instance.port,
			instance.group,
			instances.len()
		);
		self.notify(&instance.service, &instance.group, instances);
		Ok(())
	}

	async fn deregister(&self, instance: &ServiceInstance) -> ClResult<()> {
		let instances = {
			let mut services = self.services.write();
			let key = Self::key(&instance.service, &instance.group);
			let list = services.get_mut(&key);
			let Some(list) = list.filter(|l| l.iter().any(|i| i.ip == instance.ip && i.port == instance.port))
			else {
				return Err(MemoryDiscoveryError::UnknownInstance(format!(
					"{}@{}:{}",
					instance.service, instance.ip, instance.port
				))
				.into());
			};
			list.retain(|i| !(i.ip == instance.ip && i.port == instance.port));
			let remaining = list.clone();
			if remaining.is_empty() {
				services.remove(&key);
			}
			remaining
		};
		info!("Deregistered {}@{}:{} from {}", instance.service, instance.ip, instance.port, instance.group);
		self.notify(&instance.service, &instance.group, instances);
		Ok(())
	}

	async fn list(&self, service: &str, group: &str) -> ClResult<Vec<ServiceInstance>> {
		Ok(self.snapshot(service, group))
	}

	async fn subscribe(
		&self,
		service: &str,
		group: &str,
	) -> ClResult<Pin<Box<dyn Stream<Item = MembershipEvent> + Send>>> {
		// Subscribe to broadcast FIRST to avoid losing changes between snapshot and subscribe
		let mut rx = self.change_tx.subscribe();
		let initial = MembershipEvent { service: service.into(), instances: self.snapshot(service, group) };
		let service: Box<str> = service.into();
		let group: Box<str> = group.into();

		let stream = async_stream::stream! {
			yield initial;
			loop {
				match rx.recv().await {
					Ok(change) => {
						if change.event.service == service && change.group == group {
							yield change.event;
						}
					}
					Err(broadcast::error::RecvError::Lagged(n)) => {
						// Snapshots are complete, so the next one catches up
						warn!("Membership subscription for {} lagged, missed {} changes", service, n);
						continue;
					}
					Err(broadcast::error::RecvError::Closed) => {
						break;
					}
				}
			}
		};

		Ok(Box::pin(stream))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::StreamExt;

	fn instance(port: u16) -> ServiceInstance {
		ServiceInstance::new("svc", "DEFAULT_GROUP", "10.0.0.1", port)
	}

	#[tokio::test]
	async fn test_register_and_list() {
		let adapter = MemoryDiscoveryAdapter::new();
		adapter.register(&instance(1)).await.unwrap();
		adapter.register(&instance(2)).await.unwrap();
		adapter.register(&instance(2)).await.unwrap();

		assert_eq!(adapter.list("svc", "DEFAULT_GROUP").await.unwrap().len(), 2);
		assert!(adapter.list("svc", "OTHER").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_deregister_unknown_is_error() {
		let adapter = MemoryDiscoveryAdapter::new();
		let err = adapter.deregister(&instance(1)).await.unwrap_err();
		assert!(matches!(err, Error::Discovery(_)));

		adapter.register(&instance(1)).await.unwrap();
		adapter.deregister(&instance(1)).await.unwrap();
		assert!(adapter.list("svc", "DEFAULT_GROUP").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_register_rejects_empty_service() {
		let adapter = MemoryDiscoveryAdapter::new();
		let bad = ServiceInstance::new("", "g", "10.0.0.1", 1);
		assert!(adapter.register(&bad).await.is_err());
	}

	#[tokio::test]
	async fn test_subscribe_yields_current_then_changes() {
		let adapter = MemoryDiscoveryAdapter::new();
		adapter.register(&instance(1)).await.unwrap();

		let mut events = adapter.subscribe("svc", "DEFAULT_GROUP").await.unwrap();
		assert_eq!(events.next().await.unwrap().active_count(), 1);

		// Other groups are not delivered
		adapter.register(&ServiceInstance::new("svc", "OTHER", "10.0.0.9", 1)).await.unwrap();
		adapter.register(&instance(2)).await.unwrap();
		assert_eq!(events.next().await.unwrap().active_count(), 2);

		let mut unhealthy = instance(3);
		unhealthy.healthy = false;
		adapter.register(&unhealthy).await.unwrap();
		let event = events.next().await.unwrap();
		assert_eq!(event.instances.len(), 3);
		assert_eq!(event.active_count(), 2);

		adapter.deregister(&instance(1)).await.unwrap();
		assert_eq!(events.next().await.unwrap().active_count(), 1);
	}
}

// vim: ts=4
