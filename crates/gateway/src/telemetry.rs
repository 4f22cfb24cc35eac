//! Ambient metrics — SPEC_FULL.md §A.4. A small `prometheus-client`
//! registry standing in for the teacher's full OpenTelemetry pipeline,
//! scaled down to the handful of gauges/counters this gateway's
//! operators actually need (see DESIGN.md for the scope call).

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct TopicLabel {
	pub topic: String,
}

pub struct Metrics {
	registry: Registry,
	pub envelopes_admitted: Family<TopicLabel, Counter>,
	pub envelopes_denied: Family<TopicLabel, Counter>,
	pub active_sessions: Gauge,
	pub grants_outstanding: Gauge,
	pub slow_consumer_evictions: Counter,
}

impl Metrics {
	pub fn new() -> Self {
		let mut registry = Registry::default();
		let envelopes_admitted = Family::<TopicLabel, Counter>::default();
		let envelopes_denied = Family::<TopicLabel, Counter>::default();
		let active_sessions = Gauge::default();
		let grants_outstanding = Gauge::default();
		let slow_consumer_evictions = Counter::default();

		registry.register("mew_envelopes_admitted", "Envelopes that passed admission", envelopes_admitted.clone());
		registry.register("mew_envelopes_denied", "Envelopes rejected by the capability engine", envelopes_denied.clone());
		registry.register("mew_active_sessions", "Currently connected WebSocket sessions", active_sessions.clone());
		registry.register("mew_grants_outstanding", "Grants pending ack or currently active", grants_outstanding.clone());
		registry.register("mew_slow_consumer_evictions_total", "Sessions evicted for a full outbound queue", slow_consumer_evictions.clone());

		Self {
			registry,
			envelopes_admitted,
			envelopes_denied,
			active_sessions,
			grants_outstanding,
			slow_consumer_evictions,
		}
	}

	pub fn encode(&self) -> String {
		let mut buf = String::new();
		let _ = encode(&mut buf, &self.registry);
		buf
	}
}

impl Default for Metrics {
	fn default() -> Self {
		Self::new()
	}
}
