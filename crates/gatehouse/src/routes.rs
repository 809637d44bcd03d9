//! Routes of the service

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::get;
use chrono::SecondsFormat;
use metrics_exporter_prometheus::PrometheusHandle;

use gatehouse_core::admission::{FlowControlConfig, FlowControlLayer, IpFilterLayer};

use crate::app::App;
use crate::webserver::log_request;

async fn get_root() -> &'static str {
	"OK"
}

async fn head_root() -> StatusCode {
	StatusCode::OK
}

/// Current local time
async fn get_time() -> String {
	chrono::Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Build the router. Every service route goes through the IP filter and flow
/// control layers; the metrics endpoint does not.
pub fn init(app: &App, prometheus: Option<PrometheusHandle>) -> Router {
	let flow_config =
		FlowControlConfig::default().resource_extractor(app.loader.resource_param_extractor());

	let router = Router::new()
		.route("/", get(get_root).head(head_root))
		.route("/q", get(get_time))
		.layer(FlowControlLayer::new(app.loader.limiter(), app.metrics.clone(), flow_config))
		.layer(IpFilterLayer::new(app.loader.filter_handle(), app.metrics.clone(), app.opts.mode));

	let router = match prometheus {
		Some(handle) => {
			router.route(&app.opts.metrics_path, get(move || async move { handle.render() }))
		}
		None => router,
	};

	router.layer(middleware::from_fn(log_request))
}

// vim: ts=4
