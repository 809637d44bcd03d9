//! Flow control middleware
//!
//! Asks the flow limiter for an entry per request and holds it until the
//! downstream handler finishes. Every request passing through the stage is
//! recorded in [`AdmissionMetrics`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use futures::future::BoxFuture;
use hyper::Request;
use tower::{Layer, Service};

use super::reject::AdmissionReject;
use crate::limiter::{FlowBlocked, FlowLimiter};
use crate::metrics::AdmissionMetrics;
use crate::prelude::*;

/// Maps a request to the resource it is counted against
pub type ResourceExtractor = Arc<dyn Fn(&Request<Body>) -> String + Send + Sync>;

/// Builds the response for a throttled request
pub type BlockFallback = Arc<dyn Fn(&FlowBlocked) -> Response + Send + Sync>;

/// Flow control stage settings
#[derive(Clone)]
pub struct FlowControlConfig {
	/// Only requests to this exact path are limited. `None` limits all paths.
	pub path: Option<Box<str>>,
	/// Defaults to [`method_route_resource`]
	pub resource_extractor: ResourceExtractor,
	/// Defaults to [`AdmissionReject::Throttled`]: HTTP 400 with code 10222
	pub block_fallback: BlockFallback,
}

impl Default for FlowControlConfig {
	fn default() -> Self {
		Self {
			path: None,
			resource_extractor: Arc::new(method_route_resource),
			block_fallback: Arc::new(|_| AdmissionReject::Throttled.into_response()),
		}
	}
}

impl FlowControlConfig {
	pub fn path(mut self, path: impl Into<Box<str>>) -> Self {
		self.path = Some(path.into());
		self
	}

	pub fn resource_extractor(
		mut self,
		f: impl Fn(&Request<Body>) -> String + Send + Sync + 'static,
	) -> Self {
		self.resource_extractor = Arc::new(f);
		self
	}

	pub fn block_fallback(mut self, f: impl Fn(&FlowBlocked) -> Response + Send + Sync + 'static) -> Self {
		self.block_fallback = Arc::new(f);
		self
	}
}

impl std::fmt::Debug for FlowControlConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FlowControlConfig").field("path", &self.path).finish_non_exhaustive()
	}
}

/// `"{METHOD}:{route}"`, e.g. `GET:/users/{id}`. Uses the URI path when no
/// route matched.
pub fn method_route_resource(req: &Request<Body>) -> String {
	let route = req
		.extensions()
		.get::<MatchedPath>()
		.map_or_else(|| req.uri().path(), MatchedPath::as_str);
	format!("{}:{}", req.method(), route)
}

/// Flow control middleware layer
#[derive(Clone)]
pub struct FlowControlLayer {
	limiter: Arc<dyn FlowLimiter>,
	metrics: Arc<AdmissionMetrics>,
	config: Arc<FlowControlConfig>,
}

impl FlowControlLayer {
	pub fn new(
		limiter: Arc<dyn FlowLimiter>,
		metrics: Arc<AdmissionMetrics>,
		config: FlowControlConfig,
	) -> Self {
		Self { limiter, metrics, config: Arc::new(config) }
	}
}

impl<S> Layer<S> for FlowControlLayer {
	type Service = FlowControlService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		FlowControlService {
			inner,
			limiter: self.limiter.clone(),
			metrics: self.metrics.clone(),
			config: self.config.clone(),
		}
	}
}

/// Flow control middleware service
#[derive(Clone)]
pub struct FlowControlService<S> {
	inner: S,
	limiter: Arc<dyn FlowLimiter>,
	metrics: Arc<AdmissionMetrics>,
	config: Arc<FlowControlConfig>,
}

impl<S> Service<Request<Body>> for FlowControlService<S>
where
	S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
	S::Future: Send + 'static,
{
	type Response = S::Response;
	type Error = S::Error;
	type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.inner.poll_ready(cx)
	}

	fn call(&mut self, req: Request<Body>) -> Self::Future {
		let start = Instant::now();
		let limiter = self.limiter.clone();
		let metrics = self.metrics.clone();
		let config = self.config.clone();
		let mut inner = self.inner.clone();

		Box::pin(async move {
			let path = req.uri().path().to_string();
			if config.path.as_deref().is_some_and(|scope| scope != path) {
				return inner.call(req).await;
			}

			let resource = (config.resource_extractor)(&req);
			let entry = match limiter.entry(&resource) {
				Ok(entry) => entry,
				Err(blocked) => {
					debug!("{}", blocked);
					let res = (config.block_fallback)(&blocked);
					metrics.record_block(res.status().as_u16(), &path, &resource, start.elapsed());
					return Ok(res);
				}
			};

			// The entry is released when it goes out of scope, including on
			// cancellation of this future
			let outcome = AssertUnwindSafe(inner.call(req)).catch_unwind().await;
			drop(entry);

			// Handler errors and panics count as 500
			let status = match &outcome {
				Ok(Ok(res)) => res.status().as_u16(),
				_ => 500,
			};
			metrics.record_pass(status, &path, &resource, start.elapsed());

			match outcome {
				Ok(result) => result,
				Err(panic) => std::panic::resume_unwind(panic),
			}
		})
	}
}


// vim: ts=4
