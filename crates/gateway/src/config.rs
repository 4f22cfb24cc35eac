//! Configuration — spec.md §6, expanded per SPEC_FULL.md §A.3.
//!
//! Follows the teacher's two-stage pattern: a `Raw*` struct mirrors
//! exactly what a user may put in a config file (every field optional),
//! resolved into a fully-populated runtime `Config`/`TopicConfig` with
//! defaults applied.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::{Rule, RuleSet};
use crate::participant::{Participant, ParticipantKind};
use crate::ratelimit::RateLimitConfig;

fn default_bind_addr() -> String {
	"0.0.0.0:8080".to_string()
}

/// A pre-provisioned participant row, resolved from config at startup
/// (spec.md §4.3: `accept` authenticates "against the resolved
/// participant table for the requested topic"). Participants created
/// later via `space/invite` are added to the live topic state directly
/// and never appear here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawParticipantConfig {
	pub id: String,
	pub name: Option<String>,
	#[serde(default)]
	pub kind: Option<String>,
	pub tokens: Vec<String>,
	#[serde(default)]
	pub capabilities: Vec<Rule>,
}

impl RawParticipantConfig {
	fn resolve(&self) -> Participant {
		let mut p = Participant::new(
			self.id.clone(),
			self.name.clone().unwrap_or_else(|| self.id.clone()),
			self.kind.as_deref().map(ParticipantKind::from).unwrap_or(ParticipantKind::Agent),
			RuleSet::new(self.capabilities.clone()),
		);
		p.tokens = self.tokens.iter().cloned().collect();
		p
	}
}

/// On-disk configuration shape (YAML or JSON).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawGatewayConfig {
	pub bind_addr: Option<String>,
	/// Disables `POST /v0/auth/token` regardless of any other setting
	/// (spec.md §4.8: "MUST be disabled in production-mode builds").
	pub production_mode: Option<bool>,
	/// Bearer token required to call `POST /v0/auth/token` (spec.md §4.8:
	/// "all require bearer auth except health" — the dev-token endpoint's
	/// "dev only, optional" carve-out is about its *existence*, not about
	/// exempting it from auth). Unset means the endpoint is unreachable:
	/// no token value authenticates against an absent admin token.
	pub admin_token: Option<String>,
	pub log_json: Option<bool>,
	#[serde(default)]
	pub allowed_origins: Vec<String>,
	#[serde(default)]
	pub topics: HashMap<String, RawTopicConfig>,
	pub defaults: Option<RawTopicConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawTopicConfig {
	pub max_participants: Option<usize>,
	pub history_limit: Option<usize>,
	pub history_byte_limit: Option<usize>,
	pub heartbeat_interval_secs: Option<u64>,
	pub slow_consumer_drain_budget_secs: Option<u64>,
	pub grant_ack_timeout_secs: Option<u64>,
	pub stream_open_timeout_secs: Option<u64>,
	pub welcome_history_limit: Option<usize>,
	/// Absent (the default) disables per-participant rate limiting
	/// entirely — SPEC_FULL.md §B.
	pub rate_limit_envelopes_per_sec: Option<f64>,
	pub rate_limit_burst: Option<f64>,
	#[serde(default)]
	pub participants: Vec<RawParticipantConfig>,
}

/// Fully-resolved per-topic limits, spec.md §3 "Topic" optional
/// configuration and §6 defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopicConfig {
	pub max_participants: usize,
	pub history_limit: usize,
	pub history_byte_limit: usize,
	#[serde(with = "duration_secs")]
	pub heartbeat_interval: Duration,
	#[serde(with = "duration_secs")]
	pub slow_consumer_drain_budget: Duration,
	#[serde(with = "duration_secs")]
	pub grant_ack_timeout: Duration,
	#[serde(with = "duration_secs")]
	pub stream_open_timeout: Duration,
	pub welcome_history_limit: usize,
	pub rate_limit: Option<RateLimitConfig>,
}

impl Default for TopicConfig {
	fn default() -> Self {
		Self {
			max_participants: 50,
			history_limit: 1000,
			history_byte_limit: 10 * 1024 * 1024,
			heartbeat_interval: Duration::from_secs(30),
			slow_consumer_drain_budget: Duration::from_secs(5),
			grant_ack_timeout: Duration::from_secs(60),
			stream_open_timeout: Duration::from_secs(30),
			welcome_history_limit: 100,
			rate_limit: None,
		}
	}
}

impl TopicConfig {
	fn merge_raw(mut self, raw: &RawTopicConfig) -> Self {
		if let Some(v) = raw.max_participants {
			self.max_participants = v;
		}
		if let Some(v) = raw.history_limit {
			self.history_limit = v;
		}
		if let Some(v) = raw.history_byte_limit {
			self.history_byte_limit = v;
		}
		if let Some(v) = raw.heartbeat_interval_secs {
			self.heartbeat_interval = Duration::from_secs(v);
		}
		if let Some(v) = raw.slow_consumer_drain_budget_secs {
			self.slow_consumer_drain_budget = Duration::from_secs(v);
		}
		if let Some(v) = raw.grant_ack_timeout_secs {
			self.grant_ack_timeout = Duration::from_secs(v);
		}
		if let Some(v) = raw.stream_open_timeout_secs {
			self.stream_open_timeout = Duration::from_secs(v);
		}
		if let Some(v) = raw.welcome_history_limit {
			self.welcome_history_limit = v;
		}
		if raw.rate_limit_envelopes_per_sec.is_some() || raw.rate_limit_burst.is_some() {
			let defaults = RateLimitConfig::default();
			self.rate_limit = Some(RateLimitConfig {
				envelopes_per_sec: raw.rate_limit_envelopes_per_sec.unwrap_or(defaults.envelopes_per_sec),
				burst: raw.rate_limit_burst.unwrap_or(defaults.burst),
			});
		}
		self
	}
}

mod duration_secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		Ok(Duration::from_secs(u64::deserialize(d)?))
	}
}

/// Fully-resolved gateway-wide configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
	pub bind_addr: SocketAddr,
	pub production_mode: bool,
	pub admin_token: Option<String>,
	pub log_json: bool,
	pub allowed_origins: Vec<String>,
	pub default_topic_config: TopicConfig,
	pub topic_overrides: HashMap<String, TopicConfig>,
	/// Pre-provisioned participant rows per topic (spec.md §4.3), keyed by
	/// topic name. A topic with no entry here starts with an empty
	/// participant table — every identity must arrive via `space/invite`.
	pub topic_participants: HashMap<String, Vec<Participant>>,
}

impl GatewayConfig {
	pub fn resolve(raw: RawGatewayConfig) -> anyhow::Result<Self> {
		let bind_addr = raw
			.bind_addr
			.unwrap_or_else(default_bind_addr)
			.parse()
			.map_err(|e| anyhow::anyhow!("invalid bindAddr: {e}"))?;
		let default_topic_config = match &raw.defaults {
			Some(d) => TopicConfig::default().merge_raw(d),
			None => TopicConfig::default(),
		};
		let topic_overrides = raw
			.topics
			.iter()
			.map(|(name, cfg)| (name.clone(), default_topic_config.clone().merge_raw(cfg)))
			.collect();
		let topic_participants = raw
			.topics
			.iter()
			.map(|(name, cfg)| (name.clone(), cfg.participants.iter().map(RawParticipantConfig::resolve).collect()))
			.collect();
		Ok(Self {
			bind_addr,
			production_mode: raw.production_mode.unwrap_or(false),
			admin_token: raw.admin_token.clone(),
			log_json: raw.log_json.unwrap_or(false),
			allowed_origins: raw.allowed_origins,
			default_topic_config,
			topic_overrides,
			topic_participants,
		})
	}

	pub fn topic_config(&self, topic: &str) -> TopicConfig {
		self
			.topic_overrides
			.get(topic)
			.cloned()
			.unwrap_or_else(|| self.default_topic_config.clone())
	}

	pub fn participants_for(&self, topic: &str) -> Vec<Participant> {
		self.topic_participants.get(topic).cloned().unwrap_or_default()
	}

	/// The dev-only token-mint endpoint is only ever wired up when this is
	/// true (spec.md §4.8).
	pub fn dev_auth_token_enabled(&self) -> bool {
		!self.production_mode
	}

	/// Bearer-auth check for `POST /v0/auth/token` itself (spec.md §4.8:
	/// "all require bearer auth except health" binds this endpoint too,
	/// not just the sessions it mints tokens for). No `admin_token`
	/// configured means no token value can ever authenticate.
	pub fn authenticate_admin(&self, token: &str) -> bool {
		self.admin_token.as_deref().is_some_and(|expected| expected == token)
	}

	pub fn from_yaml_str(s: &str) -> anyhow::Result<Self> {
		let raw: RawGatewayConfig = serde_yaml::from_str(s)?;
		Self::resolve(raw)
	}
}
