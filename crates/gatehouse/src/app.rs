//! App builder - constructs and runs a Gatehouse service

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gatehouse_core::limiter::{FlowLimiter, WindowFlowLimiter};
use gatehouse_core::metrics::{AdmissionMetrics, DURATION_BUCKETS, REQUEST_DURATION, UPTIME};
use gatehouse_core::watch::{
	DEFAULT_MEMBERSHIP_DEBOUNCE, spawn_config_watch, spawn_event_loop, spawn_membership_watch,
};
use gatehouse_core::{RuleLoader, ServerMode};
use gatehouse_types::config_adapter::{ConfigAdapter, ConfigEvent};
use gatehouse_types::discovery_adapter::{DiscoveryAdapter, ServiceInstance};
use gatehouse_types::rules::FlowRule;

use crate::prelude::*;
use crate::{routes, webserver};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

#[derive(Debug, Clone)]
pub struct AppOpts {
	pub service_name: Box<str>,
	pub listen: Box<str>,
	/// Address registered in the discovery backend
	pub advertise_ip: Box<str>,
	pub advertise_port: u16,
	pub weight: f64,
	/// Discovery and config store group
	pub group: Box<str>,
	/// Config key of the rule document
	pub rule_id: Box<str>,
	pub mode: ServerMode,
	pub membership_debounce: Duration,
	pub metrics_path: Box<str>,
}

impl AppOpts {
	/// The instance this service registers as
	pub fn instance(&self) -> ServiceInstance {
		let mut instance =
			ServiceInstance::new(&self.service_name, &self.group, &self.advertise_ip, self.advertise_port);
		instance.weight = self.weight;
		instance.metadata.insert("version".into(), VERSION.into());
		instance
	}
}

pub struct AppState {
	pub opts: AppOpts,
	pub loader: Arc<RuleLoader>,
	pub metrics: Arc<AdmissionMetrics>,
	pub discovery: Arc<dyn DiscoveryAdapter>,
	pub config: Arc<dyn ConfigAdapter>,
	/// Stops every background task of the app
	pub cancel: CancellationToken,
}

pub type App = Arc<AppState>;

impl std::fmt::Debug for AppState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AppState").field("opts", &self.opts).field("loader", &self.loader).finish_non_exhaustive()
	}
}

impl AppState {
	/// Install flow rules directly, bypassing the rule document
	pub fn load_rules(&self, rules: &[FlowRule]) -> ClResult<()> {
		self.loader.load_rules(rules)
	}

	/// Register this instance in the discovery backend
	pub async fn register(&self) -> ClResult<()> {
		let instance = self.opts.instance();
		self.discovery.register(&instance).await?;
		info!(
			"Registered {} at {}:{} in {}",
			instance.service, instance.ip, instance.port, instance.group
		);
		Ok(())
	}

	pub async fn deregister(&self) -> ClResult<()> {
		let instance = self.opts.instance();
		self.discovery.deregister(&instance).await?;
		info!("Deregistered {} at {}:{}", instance.service, instance.ip, instance.port);
		Ok(())
	}

	/// Fetch a config value from the app's group
	pub async fn get_config(&self, id: &str) -> ClResult<Box<str>> {
		self.config.get(id, &self.opts.group).await
	}

	/// Run `callback` for every change of config value `id` until the app
	/// shuts down
	pub async fn on_config_change<F>(&self, id: &str, callback: F) -> ClResult<JoinHandle<()>>
	where
		F: FnMut(ConfigEvent) + Send + 'static,
	{
		let events = self.config.watch(id, &self.opts.group).await?;
		Ok(spawn_event_loop(events, self.cancel.child_token(), callback))
	}

	/// Fetch the rule document and make it active. A missing or invalid
	/// document leaves the current rules in place.
	pub async fn load_initial_rules(&self) -> ClResult<()> {
		match self.get_config(&self.opts.rule_id).await {
			Ok(doc) => self.loader.apply_document(&doc),
			Err(Error::NotFound) => {
				warn!("No rule document {}/{} published yet", self.opts.group, self.opts.rule_id);
				Ok(())
			}
			Err(e) => Err(e),
		}
	}

	/// Follow rule document changes and membership changes of the service
	pub async fn start_watches(&self) -> ClResult<()> {
		let events = self.config.watch(&self.opts.rule_id, &self.opts.group).await?;
		spawn_config_watch(self.loader.clone(), events, self.cancel.child_token());

		let members = self.discovery.subscribe(&self.opts.service_name, &self.opts.group).await?;
		spawn_membership_watch(
			self.loader.clone(),
			members,
			self.opts.membership_debounce,
			self.cancel.child_token(),
		);
		info!("Watching {}/{} and membership of {}", self.opts.group, self.opts.rule_id, self.opts.service_name);
		Ok(())
	}

	/// Stop background tasks and the server
	pub fn shutdown(&self) {
		self.cancel.cancel();
	}
}

fn install_prometheus() -> ClResult<PrometheusHandle> {
	PrometheusBuilder::new()
		.set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), &DURATION_BUCKETS)
		.and_then(PrometheusBuilder::install_recorder)
		.map_err(|e| {
			error!("FATAL: Failed to install Prometheus recorder: {}", e);
			Error::Internal(format!("Failed to install Prometheus recorder: {}", e))
		})
}

/// Count process uptime in seconds and keep the exporter's histograms current
fn spawn_uptime(handle: PrometheusHandle, cancel: CancellationToken) {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(Duration::from_secs(1));
		loop {
			tokio::select! {
				() = cancel.cancelled() => break,
				_ = ticker.tick() => {
					counter!(UPTIME).increment(1);
					handle.run_upkeep();
				}
			}
		}
	});
}

pub struct AppBuilder {
	opts: AppOpts,
	discovery: Option<Arc<dyn DiscoveryAdapter>>,
	config: Option<Arc<dyn ConfigAdapter>>,
	limiter: Option<Arc<dyn FlowLimiter>>,
}

impl AppBuilder {
	pub fn new() -> Self {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.try_init();
		AppBuilder {
			opts: AppOpts {
				service_name: "gatehouse".into(),
				listen: "0.0.0.0:8080".into(),
				advertise_ip: "127.0.0.1".into(),
				advertise_port: 8080,
				weight: 10.0,
				group: DEFAULT_GROUP.into(),
				rule_id: "rules".into(),
				mode: ServerMode::Standalone,
				membership_debounce: DEFAULT_MEMBERSHIP_DEBOUNCE,
				metrics_path: "/metrics".into(),
			},
			discovery: None,
			config: None,
			limiter: None,
		}
	}

	// Opts
	pub fn service_name(&mut self, service_name: impl Into<Box<str>>) -> &mut Self {
		self.opts.service_name = service_name.into();
		self
	}
	pub fn listen(&mut self, listen: impl Into<Box<str>>) -> &mut Self {
		self.opts.listen = listen.into();
		self
	}
	pub fn advertise(&mut self, ip: impl Into<Box<str>>, port: u16) -> &mut Self {
		self.opts.advertise_ip = ip.into();
		self.opts.advertise_port = port;
		self
	}
	pub fn weight(&mut self, weight: f64) -> &mut Self {
		self.opts.weight = weight;
		self
	}
	pub fn group(&mut self, group: impl Into<Box<str>>) -> &mut Self {
		self.opts.group = group.into();
		self
	}
	pub fn rule_id(&mut self, rule_id: impl Into<Box<str>>) -> &mut Self {
		self.opts.rule_id = rule_id.into();
		self
	}
	pub fn mode(&mut self, mode: ServerMode) -> &mut Self {
		self.opts.mode = mode;
		self
	}
	pub fn membership_debounce(&mut self, debounce: Duration) -> &mut Self {
		self.opts.membership_debounce = debounce;
		self
	}
	pub fn metrics_path(&mut self, metrics_path: impl Into<Box<str>>) -> &mut Self {
		self.opts.metrics_path = metrics_path.into();
		self
	}

	// Adapters
	pub fn discovery_adapter(&mut self, discovery: Arc<dyn DiscoveryAdapter>) -> &mut Self {
		self.discovery = Some(discovery);
		self
	}
	pub fn config_adapter(&mut self, config: Arc<dyn ConfigAdapter>) -> &mut Self {
		self.config = Some(config);
		self
	}
	pub fn flow_limiter(&mut self, limiter: Arc<dyn FlowLimiter>) -> &mut Self {
		self.limiter = Some(limiter);
		self
	}

	/// Assemble the app without registering, watching or serving
	pub fn build(self) -> ClResult<App> {
		let Some(discovery) = self.discovery else {
			error!("FATAL: No discovery adapter configured");
			return Err(Error::Internal("No discovery adapter configured".to_string()));
		};
		let Some(config) = self.config else {
			error!("FATAL: No config adapter configured");
			return Err(Error::Internal("No config adapter configured".to_string()));
		};
		if self.opts.service_name.is_empty() {
			error!("FATAL: Empty service name");
			return Err(Error::Internal("Empty service name".to_string()));
		}
		if !self.opts.metrics_path.starts_with('/') {
			error!("FATAL: Invalid metrics path {:?}", self.opts.metrics_path);
			return Err(Error::Internal(format!("Invalid metrics path {:?}", self.opts.metrics_path)));
		}

		let limiter = self.limiter.unwrap_or_else(|| Arc::new(WindowFlowLimiter::new()));
		Ok(Arc::new(AppState {
			opts: self.opts,
			loader: Arc::new(RuleLoader::new(limiter)),
			metrics: Arc::new(AdmissionMetrics::new()),
			discovery,
			config,
			cancel: CancellationToken::new(),
		}))
	}

	pub async fn run(self) -> ClResult<()> {
		info!("Gatehouse V{}", VERSION);

		let prometheus = install_prometheus()?;
		let app = self.build()?;

		app.register().await.map_err(|e| {
			error!("FATAL: Registration failed: {}", e);
			e
		})?;

		if let Err(e) = app.load_initial_rules().await {
			warn!("Starting without rules: {}", e);
		}
		if let Err(e) = app.start_watches().await {
			warn!("Rule and membership updates disabled: {}", e);
		}
		spawn_uptime(prometheus.clone(), app.cancel.child_token());

		let router = routes::init(&app, Some(prometheus));
		let res = webserver::serve(&app.opts.listen, router, app.cancel.clone()).await;

		app.shutdown();
		if let Err(e) = app.deregister().await {
			warn!("Deregistration failed: {}", e);
		}
		info!("Stopped");
		res
	}
}

impl Default for AppBuilder {
	fn default() -> Self {
		Self::new()
	}
}


// vim: ts=4
