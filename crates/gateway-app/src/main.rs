//! `mew-gateway` binary — loads configuration, wires up logging, and
//! serves the HTTP/WebSocket surface (spec.md §4.8, SPEC_FULL.md §A.3).

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use mew_gateway::config::{GatewayConfig, RawGatewayConfig};
use mew_gateway::http::{self, AppState};
use mew_gateway::registry::TopicRegistry;
use tracing::info;

/// Runs a MEW protocol gateway.
#[derive(Parser, Debug)]
#[command(name = "mew-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
	/// Path to a YAML config file. Omit to run with built-in defaults
	/// (spec.md §6 defaults, no pre-provisioned participants).
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Overrides `bindAddr` from the config file.
	#[arg(long)]
	bind: Option<String>,

	/// Emit structured JSON logs instead of human-readable ones. Overrides
	/// `logJson` from the config file.
	#[arg(long)]
	log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let mut raw = match &cli.config {
		Some(path) => {
			let contents = std::fs::read_to_string(path).with_context(|| format!("reading config file `{}`", path.display()))?;
			serde_yaml::from_str::<RawGatewayConfig>(&contents).with_context(|| format!("parsing config file `{}`", path.display()))?
		},
		None => RawGatewayConfig::default(),
	};
	if let Some(bind) = cli.bind {
		raw.bind_addr = Some(bind);
	}
	if cli.log_json {
		raw.log_json = Some(true);
	}

	let config = GatewayConfig::resolve(raw).context("resolving gateway configuration")?;
	mew_core::logging::init(config.log_json);

	let bind_addr = config.bind_addr;
	let registry = std::sync::Arc::new(TopicRegistry::new(config));
	let app = http::router(AppState { registry });

	let listener = tokio::net::TcpListener::bind(bind_addr).await.with_context(|| format!("binding to {bind_addr}"))?;
	info!(addr = %bind_addr, "mew-gateway listening");
	axum::serve(listener, app).await.context("serving gateway")?;
	Ok(())
}
