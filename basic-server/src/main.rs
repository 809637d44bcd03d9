use std::{env, path, process::ExitCode, sync::Arc};

use gatehouse::{AppBuilder, ServerMode};
use gatehouse_config_adapter_fs::ConfigAdapterFs;
use gatehouse_discovery_adapter_memory::MemoryDiscoveryAdapter;

pub struct Config {
	pub listen: String,
	pub service_name: String,
	pub advertise_ip: String,
	pub advertise_port: u16,
	pub config_dir: path::PathBuf,
	pub group: String,
	pub rule_id: String,
	pub mode: ServerMode,
}

fn var(name: &str, default: &str) -> String {
	env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
	fn from_env() -> Result<Self, String> {
		let listen = var("LISTEN", "0.0.0.0:8080");
		let default_port = listen.rsplit(':').next().unwrap_or("8080").to_string();
		let advertise_port = var("ADVERTISE_PORT", &default_port)
			.parse()
			.map_err(|e| format!("invalid ADVERTISE_PORT: {}", e))?;
		Ok(Config {
			service_name: var("SERVICE_NAME", "ddv"),
			advertise_ip: var("ADVERTISE_IP", "127.0.0.1"),
			advertise_port,
			config_dir: path::PathBuf::from(var("CONFIG_DIR", "./config")),
			group: var("CONFIG_GROUP", "DEFAULT_GROUP"),
			rule_id: var("RULE_ID", "rules"),
			mode: var("SERVER_MODE", "standalone").parse()?,
			listen,
		})
	}
}

#[tokio::main]
async fn main() -> ExitCode {
	let config = match Config::from_env() {
		Ok(config) => config,
		Err(e) => {
			eprintln!("Invalid configuration: {}", e);
			return ExitCode::FAILURE;
		}
	};

	let config_adapter = match ConfigAdapterFs::new(config.config_dir.clone().into()).await {
		Ok(adapter) => Arc::new(adapter),
		Err(e) => {
			eprintln!("Cannot open config dir {:?}: {}", config.config_dir, e);
			return ExitCode::FAILURE;
		}
	};

	let mut builder = AppBuilder::new();
	builder
		.service_name(config.service_name)
		.listen(config.listen)
		.advertise(config.advertise_ip, config.advertise_port)
		.group(config.group)
		.rule_id(config.rule_id)
		.mode(config.mode)
		.discovery_adapter(Arc::new(MemoryDiscoveryAdapter::new()))
		.config_adapter(config_adapter);

	match builder.run().await {
		Ok(()) => ExitCode::SUCCESS,
		Err(_) => ExitCode::FAILURE,
	}
}

// vim: ts=4
