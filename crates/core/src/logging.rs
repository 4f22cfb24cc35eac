use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initializes the global `tracing` subscriber for a gateway process.
///
/// Mirrors the teacher's filter/fields split (`RawLogging`): a single
/// `RUST_LOG`-style filter string, defaulting to `info`, and a choice
/// between human-readable and JSON output for production deployments.
pub fn init(json: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let registry = tracing_subscriber::registry().with(filter);
	if json {
		registry
			.with(tracing_subscriber::fmt::layer().json().with_target(true))
			.try_init()
			.ok();
	} else {
		registry
			.with(tracing_subscriber::fmt::layer().with_target(true))
			.try_init()
			.ok();
	}
}
