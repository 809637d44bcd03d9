//! Shared helpers for the admission integration tests

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::routing::get;

use gatehouse_core::admission::{FlowControlConfig, FlowControlLayer, IpFilterLayer};
use gatehouse_core::{AdmissionMetrics, WindowFlowLimiter, RuleLoader, ServerMode};

pub const RULES: &str = "
resource-param: cid
flow-control-rules:
  - resource: r1
    threshold: 10
  - resource: r2
    threshold: 30
ip-filter-rules:
  allowed: [10.0.0.1, 10.0.0.3]
  blocked: [10.0.0.2]
  urlPath: /q
  urlParam: cid
  authorized:
    - resource: r1
      ips: [10.0.0.1, 10.0.0.4]
    - resource: r2
      ips: [10.0.0.1]
  blockedDefault: false
";

pub fn setup_test_logging() {
	let _ = tracing_subscriber::fmt()
		.with_test_writer()
		.with_max_level(tracing::Level::DEBUG)
		.try_init();
}

pub struct TestStack {
	pub loader: Arc<RuleLoader>,
	pub metrics: Arc<AdmissionMetrics>,
	pub router: Router,
}

/// Router with `/q` (guarded and limited by the `cid` resource) and `/`
pub fn stack(rules: &str) -> TestStack {
	setup_test_logging();
	let loader = Arc::new(RuleLoader::new(Arc::new(WindowFlowLimiter::new())));
	loader.apply_document(rules).unwrap();
	let metrics = Arc::new(AdmissionMetrics::new());

	let flow = FlowControlLayer::new(
		loader.limiter(),
		metrics.clone(),
		FlowControlConfig::default().path("/q").resource_extractor(loader.resource_param_extractor()),
	);
	let ip = IpFilterLayer::new(loader.filter_handle(), metrics.clone(), ServerMode::Standalone);

	let router = Router::new()
		.route("/", get(|| async { "OK" }))
		.route("/q", get(|| async { "time" }))
		.layer(flow)
		.layer(ip);

	TestStack { loader, metrics, router }
}

pub fn request(uri: &str, ip: &str) -> Request<Body> {
	let addr: SocketAddr = format!("{}:40000", ip).parse().unwrap();
	Request::builder().uri(uri).extension(ConnectInfo(addr)).body(Body::empty()).unwrap()
}

// vim: ts=4
