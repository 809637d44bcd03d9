//! IP filter middleware
//!
//! Guards the single path named by the active filter. Requests to any other
//! path pass through untouched.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use hyper::Request;
use tower::{Layer, Service};

use super::reject::AdmissionReject;
use crate::extract::{ServerMode, extract_client_ip, query_param};
use crate::ip_filter::IpFilter;
use crate::metrics::AdmissionMetrics;
use crate::prelude::*;

/// IP filter middleware layer
#[derive(Clone)]
pub struct IpFilterLayer {
	filter: Arc<ArcSwap<IpFilter>>,
	metrics: Arc<AdmissionMetrics>,
	mode: ServerMode,
}

impl IpFilterLayer {
	pub fn new(
		filter: Arc<ArcSwap<IpFilter>>,
		metrics: Arc<AdmissionMetrics>,
		mode: ServerMode,
	) -> Self {
		Self { filter, metrics, mode }
	}
}

impl<S> Layer<S> for IpFilterLayer {
	type Service = IpFilterService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		IpFilterService {
			inner,
			filter: self.filter.clone(),
			metrics: self.metrics.clone(),
			mode: self.mode,
		}
	}
}

/// IP filter middleware service
#[derive(Clone)]
pub struct IpFilterService<S> {
	inner: S,
	filter: Arc<ArcSwap<IpFilter>>,
	metrics: Arc<AdmissionMetrics>,
	mode: ServerMode,
}

/// Decide whether `req` may reach the guarded handler. Returns the rejection
/// and the resource it was evaluated for.
fn check<B>(filter: &IpFilter, req: &Request<B>, mode: ServerMode) -> Option<(AdmissionReject, String)> {
	let resource = query_param(req, filter.resource_param());
	let Some(ip) = extract_client_ip(req, mode) else {
		// An unknown address can never be authorized
		debug!("No client address on guarded path {}", req.uri().path());
		return Some((AdmissionReject::Forbidden, resource));
	};

	if !filter.allowed_addr(&ip) {
		debug!("IP {} blocked on {}", ip, req.uri().path());
		return Some((AdmissionReject::Forbidden, resource));
	}
	if !filter.authorized_addr(&ip, &resource) {
		debug!("IP {} not authorized for resource {:?}", ip, resource);
		return Some((AdmissionReject::Forbidden, resource));
	}
	None
}

impl<S> Service<Request<Body>> for IpFilterService<S>
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
		let filter = self.filter.load_full();
		let metrics = self.metrics.clone();
		let mode = self.mode;
		let mut inner = self.inner.clone();

		Box::pin(async move {
			if !filter.guards(req.uri().path()) {
				return inner.call(req).await;
			}

			if let Some((reject, resource)) = check(&filter, &req, mode) {
				let res = reject.into_response();
				metrics.record_block(res.status().as_u16(), req.uri().path(), &resource, start.elapsed());
				return Ok(res);
			}

			inner.call(req).await
		})
	}
}


// vim: ts=4
