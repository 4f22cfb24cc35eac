//! Topic registry — lazily spawns one actor per topic name on first
//! use and hands out cheap [`TopicHandle`] clones thereafter. Mirrors the
//! teacher's `dashmap`-backed connection pools: a concurrent map guarding
//! spawn-once semantics without a global lock held across awaits.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::GatewayConfig;
use crate::telemetry::Metrics;
use crate::topic::{TopicHandle, spawn};

pub struct TopicRegistry {
	config: GatewayConfig,
	metrics: Arc<Metrics>,
	topics: DashMap<String, TopicHandle>,
}

impl TopicRegistry {
	pub fn new(config: GatewayConfig) -> Self {
		Self::with_metrics(config, Arc::new(Metrics::new()))
	}

	pub fn with_metrics(config: GatewayConfig, metrics: Arc<Metrics>) -> Self {
		Self {
			config,
			metrics,
			topics: DashMap::new(),
		}
	}

	/// Returns the handle for `name`, spawning a fresh actor the first
	/// time this topic is referenced (spec.md §2: "a participant connects
	/// → Session authenticates and joins its topic").
	pub fn get_or_spawn(&self, name: &str) -> TopicHandle {
		if let Some(existing) = self.topics.get(name) {
			return existing.clone();
		}
		let config = self.config.topic_config(name);
		let participants = self.config.participants_for(name);
		let handle = spawn(name.to_string(), config, participants, self.metrics.clone());
		self.topics.entry(name.to_string()).or_insert(handle).clone()
	}

	pub fn config(&self) -> &GatewayConfig {
		&self.config
	}

	pub fn metrics(&self) -> &Arc<Metrics> {
		&self.metrics
	}

	pub fn existing(&self, name: &str) -> Option<TopicHandle> {
		self.topics.get(name).map(|h| h.clone())
	}

	/// Every topic name that has been touched since process start — used
	/// by the HTTP admin surface's roster/history lookups, which must
	/// 404 rather than silently spawning a topic on a read-only request.
	pub fn known_topics(&self) -> Vec<String> {
		self.topics.iter().map(|e| e.key().clone()).collect()
	}
}
