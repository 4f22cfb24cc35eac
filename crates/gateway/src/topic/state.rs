use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::TopicConfig;
use crate::envelope::Envelope;
use crate::grants::Grant;
use crate::history::HistoryStore;
use crate::participant::{Participant, ParticipantSummary};
use crate::ratelimit::TokenBucket;
use crate::streams::StreamRecord;
use crate::telemetry::Metrics;

/// What a session's egress task is told to do. Topic state never talks to
/// a transport directly — it only ever sends one of these down a
/// session's outbound channel (spec.md §9 "arena pattern": no direct
/// pointers between topic and session).
#[derive(Debug, Clone)]
pub enum Outbound {
	Envelope(Envelope),
	Binary(Vec<u8>),
	/// A transport-level WebSocket ping, distinct from the protocol-level
	/// `presence/heartbeat` envelope (spec.md §4.3, §9).
	Ping,
	Close(CloseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
	DisplacedByNewer,
	SlowConsumer,
	SessionEnded,
	AuthFailed,
	/// Two consecutive transport pings went unanswered within the grace
	/// window (spec.md §4.3: "default 30s between pings; close after 2
	/// missed").
	PingTimeout,
}

impl CloseReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			CloseReason::DisplacedByNewer => "displaced_by_newer",
			CloseReason::SlowConsumer => "slow_consumer",
			CloseReason::SessionEnded => "session_ended",
			CloseReason::AuthFailed => "auth_failed",
			CloseReason::PingTimeout => "ping_timeout",
		}
	}
}

/// What the topic actor knows about one live connection. Owned entirely
/// by [`TopicState`] — a `Session` (egress task) only ever sees its own
/// receiving end, never this struct (spec.md §9).
#[derive(Debug)]
pub struct SessionHandle {
	pub participant_id: String,
	pub outbound_tx: mpsc::Sender<Outbound>,
	pub connected_at: DateTime<Utc>,
	pub last_ping_ack: DateTime<Utc>,
	pub flagged_slow_since: Option<DateTime<Utc>>,
}

/// The gateway's own synthetic sender identity for handler-produced
/// envelopes that bypass capability checks (spec.md §4.4 step 4).
pub const GATEWAY_SENDER: &str = "system:gateway";

#[derive(Debug, Serialize)]
pub struct WelcomePayload {
	pub you: ParticipantSummary,
	pub participants: Vec<ParticipantSummary>,
	pub history: Vec<Envelope>,
	pub capabilities: WelcomeCapabilities,
}

#[derive(Debug, Serialize)]
pub struct WelcomeCapabilities {
	pub history: HistoryHint,
}

#[derive(Debug, Serialize)]
pub struct HistoryHint {
	pub enabled: bool,
	pub limit: usize,
}

/// All mutable state for one topic, exclusively owned by the topic actor
/// task (spec.md §5: "topic state ... is serialized behind a topic
/// lock" — here the lock is "only one task ever touches this struct").
pub struct TopicState {
	pub name: String,
	pub config: TopicConfig,
	pub participants: IndexMap<String, Participant>,
	pub sessions: HashMap<String, SessionHandle>,
	/// The one session currently considered "live" for a participant —
	/// used to implement displaced-by-newer reconnection (spec.md §4.3).
	pub live_session: HashMap<String, String>,
	pub history: HistoryStore,
	pub streams: HashMap<String, StreamRecord>,
	pub pending_grants: HashMap<String, Grant>,
	pub start_time: DateTime<Utc>,
	pub metrics: Arc<Metrics>,
	/// Only populated when `config.rate_limit` is set; a participant with
	/// no entry is never rate limited (SPEC_FULL.md §B).
	pub rate_limiters: HashMap<String, TokenBucket>,
}

impl TopicState {
	pub fn new(name: impl Into<String>, config: TopicConfig, metrics: Arc<Metrics>) -> Self {
		Self {
			name: name.into(),
			history: HistoryStore::new(config.history_limit, Some(config.history_byte_limit)),
			config,
			participants: IndexMap::new(),
			sessions: HashMap::new(),
			live_session: HashMap::new(),
			streams: HashMap::new(),
			pending_grants: HashMap::new(),
			start_time: Utc::now(),
			metrics,
			rate_limiters: HashMap::new(),
		}
	}

	/// Takes one token from `participant_id`'s bucket, lazily creating it
	/// from the topic's configured rate limit. Always permits when rate
	/// limiting is disabled for this topic.
	pub fn check_rate_limit(&mut self, participant_id: &str, now: DateTime<Utc>) -> bool {
		let Some(cfg) = self.config.rate_limit else {
			return true;
		};
		self
			.rate_limiters
			.entry(participant_id.to_string())
			.or_insert_with(|| TokenBucket::new(cfg))
			.try_take(now)
	}

	pub fn is_full(&self) -> bool {
		self
			.participants
			.values()
			.filter(|p| p.status == crate::participant::ParticipantStatus::Online)
			.count()
			>= self.config.max_participants
	}

	pub fn present_session_ids(&self) -> Vec<String> {
		self.sessions.keys().cloned().collect()
	}

	pub fn roster(&self) -> Vec<ParticipantSummary> {
		self
			.participants
			.values()
			.filter(|p| p.status == crate::participant::ParticipantStatus::Online)
			.map(Participant::summary)
			.collect()
	}

	/// Recipients for an envelope per spec.md §4.4 step 6: addressed
	/// delivery if `to` is non-empty, else everyone present but the
	/// sender. Non-existent `to` ids are silently dropped (spec.md §3). A
	/// sender addressing themself is excluded the same as in broadcast —
	/// spec.md §8 invariant 4 ("p never receives an envelope with
	/// `from == p`") is stated unconditionally, not just for broadcast.
	pub fn addressed_or_broadcast_recipients(&self, e: &Envelope) -> Vec<String> {
		if e.to.is_empty() {
			self
				.participants
				.values()
				.filter(|p| p.status == crate::participant::ParticipantStatus::Online && p.id != e.from)
				.map(|p| p.id.clone())
				.collect()
		} else {
			e
				.to
				.iter()
				.filter(|id| {
					**id != e.from
						&& self
							.participants
							.get(*id)
							.is_some_and(|p| p.status == crate::participant::ParticipantStatus::Online)
				})
				.cloned()
				.collect()
		}
	}

	/// Observers: present participants not already a recipient, who hold
	/// a visibility capability matching `e` (spec.md §4.4 step 6, §9
	/// "explicit observer capability" resolution of the open question).
	pub fn observers(&self, e: &Envelope, recipients: &[String]) -> Vec<String> {
		self
			.participants
			.values()
			.filter(|p| {
				p.status == crate::participant::ParticipantStatus::Online
					&& p.id != e.from
					&& !recipients.contains(&p.id)
					&& p.effective_capabilities().allows(e)
			})
			.map(|p| p.id.clone())
			.collect()
	}

	pub fn session_id_for_participant(&self, participant_id: &str) -> Option<&String> {
		self.live_session.get(participant_id)
	}
}
