//! App integration tests
//!
//! Builds an app over the in-memory discovery backend and the filesystem
//! config store, and drives its router directly

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use gatehouse::config_adapter::ConfigAdapter;
use gatehouse::discovery_adapter::{DiscoveryAdapter, ServiceInstance};
use gatehouse::error::Error;
use gatehouse::rules::FlowRule;
use gatehouse::{App, AppBuilder, routes};
use gatehouse_config_adapter_fs::ConfigAdapterFs;
use gatehouse_discovery_adapter_memory::MemoryDiscoveryAdapter;

const SERVICE: &str = "ddv";
const GROUP: &str = "DDV_TEST";
const RULE_ID: &str = "DDV_RULES";

const RULES: &str = "
resource-param: cid
flow-control-rules:
  - resource: c1
    threshold: 4
ip-filter-rules:
  blocked: [10.0.0.2]
  urlPath: /q
  urlParam: cid
  authorized:
    - resource: c1
      ips: [10.0.0.1]
";

struct TestApp {
	app: App,
	discovery: Arc<MemoryDiscoveryAdapter>,
	config: Arc<ConfigAdapterFs>,
	_temp: TempDir,
}

async fn create_test_app() -> TestApp {
	let temp = TempDir::new().expect("Failed to create temp directory");
	let config = Arc::new(
		ConfigAdapterFs::new(temp.path().into())
			.await
			.expect("Failed to create config adapter")
			.with_poll_interval(Duration::from_millis(20)),
	);
	let discovery = Arc::new(MemoryDiscoveryAdapter::new());

	let mut builder = AppBuilder::new();
	builder
		.service_name(SERVICE)
		.group(GROUP)
		.rule_id(RULE_ID)
		.advertise("10.1.0.1", 8080)
		.membership_debounce(Duration::from_millis(20))
		.discovery_adapter(discovery.clone())
		.config_adapter(config.clone());
	let app = builder.build().expect("Failed to build app");
	TestApp { app, discovery, config, _temp: temp }
}

fn request(method: Method, uri: &str, ip: &str) -> Request<Body> {
	let addr: SocketAddr = format!("{}:40000", ip).parse().unwrap();
	Request::builder().method(method).uri(uri).extension(ConnectInfo(addr)).body(Body::empty()).unwrap()
}

async fn eventually(check: impl Fn() -> bool) {
	for _ in 0..200 {
		if check() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("condition not reached");
}

#[tokio::test]
async fn test_demo_routes() {
	let t = create_test_app().await;
	let router = routes::init(&t.app, None);

	let res = router.clone().oneshot(request(Method::GET, "/", "10.0.0.9")).await.unwrap();
	assert_eq!(res.status(), StatusCode::OK);
	assert_eq!(&res.into_body().collect().await.unwrap().to_bytes()[..], b"OK");

	let res = router.clone().oneshot(request(Method::HEAD, "/", "10.0.0.9")).await.unwrap();
	assert_eq!(res.status(), StatusCode::OK);

	// No rules yet: the guarded path guards nothing
	let res = router.oneshot(request(Method::GET, "/q", "10.0.0.9")).await.unwrap();
	assert_eq!(res.status(), StatusCode::OK);
	let body = res.into_body().collect().await.unwrap().to_bytes();
	let time = std::str::from_utf8(&body).unwrap();
	assert!(chrono::DateTime::parse_from_rfc3339(time).is_ok(), "not a timestamp: {}", time);
}

#[tokio::test]
async fn test_register_and_deregister() {
	let t = create_test_app().await;
	t.app.register().await.unwrap();
	let instances = t.discovery.list(SERVICE, GROUP).await.unwrap();
	assert_eq!(instances.len(), 1);
	assert_eq!(&*instances[0].ip, "10.1.0.1");
	assert_eq!(instances[0].port, 8080);

	t.app.deregister().await.unwrap();
	assert!(t.discovery.list(SERVICE, GROUP).await.unwrap().is_empty());
	assert!(matches!(t.app.deregister().await, Err(Error::Discovery(_))));
}

#[tokio::test]
async fn test_initial_rules_and_admission() {
	let t = create_test_app().await;
	// Nothing published yet is not an error
	t.app.load_initial_rules().await.unwrap();

	t.config.publish(RULE_ID, GROUP, RULES).await.unwrap();
	assert_eq!(&*t.app.get_config(RULE_ID).await.unwrap(), RULES);
	t.app.load_initial_rules().await.unwrap();
	let router = routes::init(&t.app, None);

	let res = router.clone().oneshot(request(Method::GET, "/q?cid=c1", "10.0.0.2")).await.unwrap();
	assert_eq!(res.status(), StatusCode::FORBIDDEN);

	for _ in 0..4 {
		let res = router.clone().oneshot(request(Method::GET, "/q?cid=c1", "10.0.0.1")).await.unwrap();
		assert_eq!(res.status(), StatusCode::OK);
	}
	let res = router.clone().oneshot(request(Method::GET, "/q?cid=c1", "10.0.0.1")).await.unwrap();
	assert_eq!(res.status(), StatusCode::BAD_REQUEST);
	let body = res.into_body().collect().await.unwrap().to_bytes();
	let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(json["code"], 10222);

	assert_eq!(t.app.metrics.get(403, "/q", "c1").unwrap().blocked, 1);
	assert_eq!(t.app.metrics.get(200, "/q", "c1").unwrap().passed, 4);
	assert_eq!(t.app.metrics.get(400, "/q", "c1").unwrap().blocked, 1);
}

#[tokio::test]
async fn test_watches_follow_config_and_membership() {
	let t = create_test_app().await;
	t.config.publish(RULE_ID, GROUP, RULES).await.unwrap();
	t.app.load_initial_rules().await.unwrap();
	t.app.register().await.unwrap();
	t.app.start_watches().await.unwrap();

	// Second instance joins: threshold is split
	t.discovery.register(&ServiceInstance::new(SERVICE, GROUP, "10.1.0.2", 8080)).await.unwrap();
	let loader = t.app.loader.clone();
	eventually(|| loader.members() == 2).await;
	assert_eq!(loader.limiter().rules(), vec![FlowRule::new("c1", 2.0)]);

	// New document: rescaled for the known membership
	let updated = RULES.replace("threshold: 4", "threshold: 10");
	t.config.publish(RULE_ID, GROUP, &updated).await.unwrap();
	eventually(|| loader.limiter().rules() == vec![FlowRule::new("c1", 5.0)]).await;

	// Broken document: previous rules stay
	t.config.publish(RULE_ID, GROUP, "flow-control-rules: {").await.unwrap();
	tokio::time::sleep(Duration::from_millis(150)).await;
	assert_eq!(loader.limiter().rules(), vec![FlowRule::new("c1", 5.0)]);
	assert_eq!(loader.active().flow_rules, vec![FlowRule::new("c1", 10.0)]);

	t.app.shutdown();
}

#[tokio::test]
async fn test_on_config_change_callback() {
	let t = create_test_app().await;
	let seen = Arc::new(AtomicUsize::new(0));
	let s = seen.clone();
	let handle = t
		.app
		.on_config_change("feature-flags", move |event| {
			assert_eq!(&*event.key, "feature-flags");
			s.fetch_add(1, Ordering::SeqCst);
		})
		.await
		.unwrap();

	t.config.publish("feature-flags", GROUP, "a: 1").await.unwrap();
	eventually(|| seen.load(Ordering::SeqCst) == 1).await;

	t.app.shutdown();
	handle.await.unwrap();
}

#[tokio::test]
async fn test_load_rules_directly() {
	let t = create_test_app().await;
	t.app.load_rules(&[FlowRule::new("GET:/", 1.0)]).unwrap();
	assert!(t.app.load_rules(&[FlowRule::new("x", f64::NAN)]).is_err());
	assert_eq!(t.app.loader.limiter().rules(), vec![FlowRule::new("GET:/", 1.0)]);
}

// vim: ts=4
