//! Adapter for the remote configuration store holding rule documents.

use async_trait::async_trait;
use futures_core::Stream;
use std::fmt::Debug;
use std::pin::Pin;

use crate::prelude::*;

/// A config value changed in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEvent {
	pub group: Box<str>,
	pub key: Box<str>,
	pub content: Box<str>,
}

#[async_trait]
pub trait ConfigAdapter: Debug + Send + Sync {
	/// Read a config value. Missing keys return `Error::NotFound`.
	async fn get(&self, key: &str, group: &str) -> ClResult<Box<str>>;

	/// Write a config value (used by tooling and tests)
	async fn publish(&self, key: &str, group: &str, content: &str) -> ClResult<()>;

	/// Watch a key. The stream yields one event per change after the call;
	/// the current value is not replayed. Dropping the stream unsubscribes.
	async fn watch(
		&self,
		key: &str,
		group: &str,
	) -> ClResult<Pin<Box<dyn Stream<Item = ConfigEvent> + Send>>>;
}

// vim: ts=4
