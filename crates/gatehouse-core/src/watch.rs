//! Update loops
//!
//! Background tasks consuming config and membership streams and feeding them
//! into the [`RuleLoader`]. Every loop stops when its stream ends or its
//! cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gatehouse_types::config_adapter::ConfigEvent;
use gatehouse_types::discovery_adapter::MembershipEvent;

use crate::prelude::*;
use crate::rules::RuleLoader;

/// Default window over which membership events are coalesced
pub const DEFAULT_MEMBERSHIP_DEBOUNCE: Duration = Duration::from_millis(500);

/// Run `handler` for every item of `events` until the stream ends or `cancel`
/// fires
pub fn spawn_event_loop<T, S, F>(events: S, cancel: CancellationToken, mut handler: F) -> JoinHandle<()>
where
	T: Send + 'static,
	S: Stream<Item = T> + Send + 'static,
	F: FnMut(T) + Send + 'static,
{
	tokio::spawn(async move {
		let mut events = Box::pin(events);
		loop {
			tokio::select! {
				biased;
				() = cancel.cancelled() => break,
				event = events.next() => match event {
					Some(event) => handler(event),
					None => break,
				},
			}
		}
	})
}

/// Apply every published rule document. Documents that fail to decode or
/// validate are logged and the previous rules stay active.
pub fn spawn_config_watch<S>(loader: Arc<RuleLoader>, events: S, cancel: CancellationToken) -> JoinHandle<()>
where
	S: Stream<Item = ConfigEvent> + Send + 'static,
{
	spawn_event_loop(events, cancel, move |event: ConfigEvent| {
		info!("Rule document {}/{} changed", event.group, event.key);
		if let Err(err) = loader.apply_document(&event.content) {
			warn!("Keeping previous rules after update of {}/{}: {}", event.group, event.key, err);
		}
	})
}

/// Rebalance flow rules on membership changes.
///
/// After an event the loop keeps draining events for `debounce` and only
/// applies the last member count. A count equal to the last applied one is
/// skipped.
pub fn spawn_membership_watch<S>(
	loader: Arc<RuleLoader>,
	events: S,
	debounce: Duration,
	cancel: CancellationToken,
) -> JoinHandle<()>
where
	S: Stream<Item = MembershipEvent> + Send + 'static,
{
	tokio::spawn(async move {
		let mut events = Box::pin(events);
		let mut last_applied: Option<usize> = None;
		loop {
			let event = tokio::select! {
				biased;
				() = cancel.cancelled() => break,
				event = events.next() => event,
			};
			let Some(event) = event else { break };
			let mut members = event.active_count();

			let mut closed = false;
			let window = tokio::time::sleep(debounce);
			tokio::pin!(window);
			loop {
				tokio::select! {
					biased;
					() = cancel.cancelled() => return,
					() = &mut window => break,
					event = events.next() => match event {
						Some(event) => members = event.active_count(),
						None => {
							closed = true;
							break;
						}
					},
				}
			}

			if last_applied == Some(members) {
				debug!("Membership unchanged at {} instances", members);
			} else {
				debug!("Membership changed to {} instances", members);
				match loader.on_membership(members) {
					Ok(_) => last_applied = Some(members),
					Err(err) => warn!("Failed to rebalance for {} instances: {}", members, err),
				}
			}

			if closed {
				break;
			}
		}
		debug!("Membership watch stopped");
	})
}


// vim: ts=4
