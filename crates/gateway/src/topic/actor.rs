//! The topic actor — spec.md §5.
//!
//! One tokio task per topic owns a [`TopicState`] exclusively; every
//! mutation flows through its single command channel, one command at a
//! time. This is "the topic lock" spec.md §5 requires — implemented as
//! ownership rather than a `Mutex`, the way the teacher's session/worker
//! tasks serialize state.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::TopicConfig;
use crate::envelope::{Envelope, EnvelopeIn};
use crate::participant::{Participant, ParticipantKind};

use super::router;
use super::router::AdmitResult;
use super::state::{CloseReason, Outbound, SessionHandle, TopicState};

/// A handle callers use to talk to a running topic actor. Cheap to
/// clone; cloning does not clone the state, only the sending half of the
/// command channel (spec.md §9 arena pattern).
#[derive(Clone)]
pub struct TopicHandle {
	name: String,
	tx: mpsc::Sender<Command>,
}

enum Command {
	Join {
		token: String,
		session_id: String,
		outbound_tx: mpsc::Sender<Outbound>,
		reply: oneshot::Sender<JoinOutcome>,
	},
	Leave {
		session_id: String,
		participant_id: String,
	},
	Heartbeat {
		participant_id: String,
	},
	Pong {
		session_id: String,
	},
	Ingress {
		session_id: String,
		participant_id: String,
		envelope: EnvelopeIn,
	},
	BinaryFrame {
		participant_id: String,
		stream_id: String,
		payload: Vec<u8>,
		reply: oneshot::Sender<Result<(), crate::error::StreamError>>,
	},
	History {
		query: crate::history::HistoryQuery,
		reply: oneshot::Sender<Vec<Envelope>>,
	},
	Roster {
		reply: oneshot::Sender<Vec<crate::participant::ParticipantSummary>>,
	},
	Authenticate {
		token: String,
		reply: oneshot::Sender<bool>,
	},
	MintDevToken {
		participant_id: String,
		name: Option<String>,
		kind: Option<String>,
		reply: oneshot::Sender<Result<String, crate::error::GrantError>>,
	},
	Inject {
		participant_id: String,
		envelope: EnvelopeIn,
		reply: oneshot::Sender<AdmitResult>,
	},
	Shutdown,
}

pub enum JoinOutcome {
	Welcome(Box<Envelope>),
	Rejected(crate::error::AuthError),
}

impl TopicHandle {
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Authenticates `token` against the topic's resolved participant
	/// table, displaces any prior session for the same participant id, and
	/// returns the `system/welcome` envelope to send back (spec.md §4.3,
	/// §4.4).
	pub async fn join(&self, token: String, session_id: String, outbound_tx: mpsc::Sender<Outbound>) -> anyhow::Result<JoinOutcome> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self
			.tx
			.send(Command::Join {
				token,
				session_id,
				outbound_tx,
				reply: reply_tx,
			})
			.await
			.map_err(|_| anyhow::anyhow!("topic actor `{}` is gone", self.name))?;
		reply_rx.await.map_err(|_| anyhow::anyhow!("topic actor `{}` dropped reply", self.name))
	}

	pub async fn leave(&self, session_id: String, participant_id: String) {
		let _ = self.tx.send(Command::Leave { session_id, participant_id }).await;
	}

	/// Records a transport pong for `session_id`, resetting its ping-timeout
	/// grace window (spec.md §4.3).
	pub async fn pong(&self, session_id: String) {
		let _ = self.tx.send(Command::Pong { session_id }).await;
	}

	pub async fn ingress(&self, session_id: String, participant_id: String, envelope: EnvelopeIn) {
		let _ = self
			.tx
			.send(Command::Ingress {
				session_id,
				participant_id,
				envelope,
			})
			.await;
	}

	/// Forwards one binary stream frame to every other stream participant's
	/// outbound queue (spec.md §4.7 step 3). The router never inspects
	/// `payload`.
	pub async fn binary_frame(&self, participant_id: String, stream_id: String, payload: Vec<u8>) -> anyhow::Result<()> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self
			.tx
			.send(Command::BinaryFrame {
				participant_id,
				stream_id,
				payload,
				reply: reply_tx,
			})
			.await
			.map_err(|_| anyhow::anyhow!("topic actor `{}` is gone", self.name))?;
		reply_rx.await?.map_err(anyhow::Error::from)
	}

	pub async fn history(&self, query: crate::history::HistoryQuery) -> anyhow::Result<Vec<Envelope>> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.tx.send(Command::History { query, reply: reply_tx }).await.map_err(|_| anyhow::anyhow!("topic actor `{}` is gone", self.name))?;
		Ok(reply_rx.await?)
	}

	pub async fn roster(&self) -> anyhow::Result<Vec<crate::participant::ParticipantSummary>> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.tx.send(Command::Roster { reply: reply_tx }).await.map_err(|_| anyhow::anyhow!("topic actor `{}` is gone", self.name))?;
		Ok(reply_rx.await?)
	}

	/// Checks `token` against the live participant table without joining a
	/// session — what the HTTP admin endpoints use to authenticate a
	/// bearer token (spec.md §4.8).
	pub async fn authenticate(&self, token: String) -> anyhow::Result<bool> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.tx.send(Command::Authenticate { token, reply: reply_tx }).await.map_err(|_| anyhow::anyhow!("topic actor `{}` is gone", self.name))?;
		Ok(reply_rx.await?)
	}

	/// Dev-only convenience: mints a participant row and token directly,
	/// bypassing the `space/invite` envelope pipeline entirely (spec.md
	/// §4.8 `POST /v0/auth/token`, disabled outside dev mode by the HTTP
	/// layer).
	pub async fn mint_dev_token(&self, participant_id: String, name: Option<String>, kind: Option<String>) -> anyhow::Result<Result<String, crate::error::GrantError>> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self
			.tx
			.send(Command::MintDevToken {
				participant_id,
				name,
				kind,
				reply: reply_tx,
			})
			.await
			.map_err(|_| anyhow::anyhow!("topic actor `{}` is gone", self.name))?;
		Ok(reply_rx.await?)
	}

	/// Drives `envelope` through the same admission pipeline a WebSocket
	/// frame from `participant_id` would (spec.md §4.8, §8 round-trip
	/// law).
	pub async fn inject(&self, participant_id: String, envelope: EnvelopeIn) -> anyhow::Result<AdmitResult> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self
			.tx
			.send(Command::Inject {
				participant_id,
				envelope,
				reply: reply_tx,
			})
			.await
			.map_err(|_| anyhow::anyhow!("topic actor `{}` is gone", self.name))?;
		Ok(reply_rx.await?)
	}

	pub async fn shutdown(&self) {
		let _ = self.tx.send(Command::Shutdown).await;
	}
}

/// Spawns the actor task, pre-seeding it with `participants` from config
/// (spec.md §4.3), and returns a handle to it.
pub fn spawn(name: impl Into<String>, config: TopicConfig, participants: Vec<Participant>, metrics: std::sync::Arc<crate::telemetry::Metrics>) -> TopicHandle {
	let name = name.into();
	let (tx, rx) = mpsc::channel(256);
	let handle = TopicHandle { name: name.clone(), tx };
	let mut state = TopicState::new(name, config, metrics);
	for p in participants {
		state.participants.insert(p.id.clone(), p);
	}
	tokio::spawn(run(state, rx));
	handle
}

async fn run(mut state: TopicState, mut rx: mpsc::Receiver<Command>) {
	let mut heartbeat = tokio::time::interval(state.config.heartbeat_interval);
	heartbeat.tick().await; // first tick fires immediately; discard it.
	loop {
		tokio::select! {
			cmd = rx.recv() => {
				match cmd {
					Some(cmd) => {
						if matches!(cmd, Command::Shutdown) {
							debug!(topic = %state.name, "topic actor shutting down");
							break;
						}
						handle_command(&mut state, cmd).await;
					}
					None => break,
				}
			}
			_ = heartbeat.tick() => {
				emit_heartbeats(&mut state).await;
			}
		}
	}
}

async fn handle_command(state: &mut TopicState, cmd: Command) {
	match cmd {
		Command::Join {
			token,
			session_id,
			outbound_tx,
			reply,
		} => {
			let outcome = do_join(state, &token, session_id, outbound_tx).await;
			let _ = reply.send(outcome);
		},
		Command::Leave { session_id, participant_id } => {
			do_leave(state, &session_id, &participant_id).await;
		},
		Command::Heartbeat { participant_id } => {
			let outcome = router::heartbeat(state, &participant_id);
			deliver(state, outcome).await;
		},
		Command::Pong { session_id } => {
			if let Some(handle) = state.sessions.get_mut(&session_id) {
				handle.last_ping_ack = chrono::Utc::now();
			}
		},
		Command::Ingress {
			session_id: _,
			participant_id,
			envelope,
		} => {
			let outcome = router::admit(state, envelope, &participant_id);
			deliver(state, outcome).await;
		},
		Command::BinaryFrame {
			participant_id,
			stream_id,
			payload,
			reply,
		} => {
			let result = deliver_binary(state, &participant_id, &stream_id, payload).await;
			let _ = reply.send(result);
		},
		Command::History { query, reply } => {
			let _ = reply.send(state.history.query(&query));
		},
		Command::Roster { reply } => {
			let _ = reply.send(state.roster());
		},
		Command::Authenticate { token, reply } => {
			let ok = state.participants.values().any(|p| p.accepts_token(&token));
			let _ = reply.send(ok);
		},
		Command::MintDevToken {
			participant_id,
			name,
			kind,
			reply,
		} => {
			let result = do_mint_dev_token(state, participant_id, name, kind);
			let _ = reply.send(result);
		},
		Command::Inject {
			participant_id,
			envelope,
			reply,
		} => {
			let result = router::admit_tracked(state, envelope, &participant_id);
			deliver(state, result.outcome.clone()).await;
			let _ = reply.send(result);
		},
		Command::Shutdown => unreachable!("handled in run()"),
	}
}

async fn do_join(state: &mut TopicState, token: &str, session_id: String, outbound_tx: mpsc::Sender<Outbound>) -> JoinOutcome {
	let Some(pid) = state
		.participants
		.values()
		.find(|p| p.accepts_token(token))
		.map(|p| p.id.clone())
	else {
		return JoinOutcome::Rejected(crate::error::AuthError::InvalidToken);
	};
	if state.is_full() && state.live_session.get(&pid).is_none() {
		return JoinOutcome::Rejected(crate::error::AuthError::TopicFull(state.name.clone()));
	}
	let displaced = router::displace_existing_sessions(state, &pid).await;
	deliver(state, displaced).await;

	state.sessions.insert(
		session_id.clone(),
		SessionHandle {
			participant_id: pid.clone(),
			outbound_tx,
			connected_at: chrono::Utc::now(),
			last_ping_ack: chrono::Utc::now(),
			flagged_slow_since: None,
		},
	);
	state.live_session.insert(pid.clone(), session_id);
	sync_active_sessions_gauge(state);

	let welcome = router::welcome_envelope(state, &pid);
	let join_outcome = router::mark_joined(state, &pid);
	deliver(state, join_outcome).await;

	match welcome {
		Some(envelope) => {
			info!(topic = %state.name, participant = %pid, "participant joined");
			JoinOutcome::Welcome(Box::new(envelope))
		},
		None => JoinOutcome::Rejected(crate::error::AuthError::UnknownTopic(state.name.clone())),
	}
}

/// Mints a participant row and bearer token directly, without going
/// through the `capability/grant`/`space/invite` envelope pipeline
/// (spec.md §4.8 `POST /v0/auth/token`). The minted participant starts
/// with an empty capability set — a dev client still needs a
/// `capability/grant` once joined to do anything beyond receive.
fn do_mint_dev_token(state: &mut TopicState, participant_id: String, name: Option<String>, kind: Option<String>) -> Result<String, crate::error::GrantError> {
	if state.participants.contains_key(&participant_id) {
		return Err(crate::error::GrantError::AlreadyExists(participant_id));
	}
	let display_name = name.unwrap_or_else(|| participant_id.clone());
	let participant_kind = kind.as_deref().map(ParticipantKind::from).unwrap_or(ParticipantKind::Human);
	let mut participant = Participant::new(participant_id.clone(), display_name, participant_kind, crate::capability::RuleSet::empty());
	let token = mew_core::id::new_token();
	participant.tokens.insert(token.clone());
	state.participants.insert(participant_id, participant);
	Ok(token)
}

async fn do_leave(state: &mut TopicState, session_id: &str, participant_id: &str) {
	if state.sessions.remove(session_id).is_none() {
		return;
	}
	sync_active_sessions_gauge(state);
	emit_leave_if_still_live(state, session_id, participant_id).await;
}

/// Emits `presence/leave` for `participant_id` iff `session_id` was still
/// its live session at the moment it was removed from `state.sessions` — a
/// session already superseded by a reconnect (spec.md §4.3 "displaced by
/// newer") must not re-emit a leave for the identity that is, from the
/// topic's perspective, still present. Shared by every eviction path
/// (graceful close, slow-consumer reap, ping-timeout reap) so none of them
/// can skip the presence event the way a bare `state.sessions.remove`
/// would.
async fn emit_leave_if_still_live(state: &mut TopicState, session_id: &str, participant_id: &str) {
	if state.live_session.get(participant_id) != Some(&session_id.to_string()) {
		return;
	}
	let outcome = router::mark_left(state, participant_id);
	deliver(state, outcome).await;
}

/// Keeps `metrics.active_sessions` in sync with `state.sessions` —
/// called at every insertion/removal site rather than derived lazily,
/// since the metrics encoder (`GET /metrics`) has no access to
/// `TopicState` itself (spec.md §2 telemetry share, SPEC_FULL.md §A.4).
pub(super) fn sync_active_sessions_gauge(state: &TopicState) {
	state.metrics.active_sessions.set(state.sessions.len() as i64);
}

async fn emit_heartbeats(state: &mut TopicState) {
	let ids: Vec<String> = state.participants.values().filter(|p| p.status == crate::participant::ParticipantStatus::Online).map(|p| p.id.clone()).collect();
	for pid in ids {
		let outcome = router::heartbeat(state, &pid);
		deliver(state, outcome).await;
	}
	send_transport_pings(state).await;
	reap_stale_pings(state).await;
	reap_slow_consumers(state).await;
	router::expire_stale_grants(state);
	router::expire_stale_streams(state);
}

/// Sends one transport-level WebSocket ping to every live session, on the
/// same cadence as the protocol-level `presence/heartbeat` (spec.md §4.3:
/// "default 30s between pings"). Independent of that envelope per spec.md
/// §9's "treats them as independent" open-question resolution.
async fn send_transport_pings(state: &mut TopicState) {
	for handle in state.sessions.values() {
		let _ = handle.outbound_tx.try_send(Outbound::Ping);
	}
}

/// Evicts any session that hasn't answered a transport ping with a pong in
/// over two heartbeat intervals (spec.md §4.3: "close after 2 missed").
async fn reap_stale_pings(state: &mut TopicState) {
	let now = chrono::Utc::now();
	let grace = chrono::Duration::from_std(state.config.heartbeat_interval).unwrap_or_default() * 2;
	let stale: Vec<String> = state
		.sessions
		.iter()
		.filter(|(_, h)| now - h.last_ping_ack > grace)
		.map(|(sid, _)| sid.clone())
		.collect();
	for sid in stale {
		if let Some(handle) = state.sessions.remove(&sid) {
			warn!(topic = %state.name, session = %sid, "evicting session with no pong response");
			sync_active_sessions_gauge(state);
			let _ = handle.outbound_tx.send(Outbound::Close(CloseReason::PingTimeout)).await;
			emit_leave_if_still_live(state, &sid, &handle.participant_id).await;
		}
	}
}

/// Slow-consumer eviction: a session whose outbound queue has been full
/// (`try_send` failing) for longer than the configured drain budget is
/// disconnected (spec.md §9, SPEC_FULL.md supplement).
async fn reap_slow_consumers(state: &mut TopicState) {
	let now = chrono::Utc::now();
	let budget = state.config.slow_consumer_drain_budget;
	let stale: Vec<String> = state
		.sessions
		.iter()
		.filter_map(|(sid, h)| {
			h.flagged_slow_since.filter(|since| now - *since > chrono::Duration::from_std(budget).unwrap_or_default()).map(|_| sid.clone())
		})
		.collect();
	for sid in stale {
		if let Some(handle) = state.sessions.remove(&sid) {
			warn!(topic = %state.name, session = %sid, "evicting slow consumer");
			state.metrics.slow_consumer_evictions.inc();
			sync_active_sessions_gauge(state);
			let _ = handle.outbound_tx.send(Outbound::Close(CloseReason::SlowConsumer)).await;
			emit_leave_if_still_live(state, &sid, &handle.participant_id).await;
		}
	}
}

async fn deliver_binary(state: &mut TopicState, participant_id: &str, stream_id: &str, payload: Vec<u8>) -> Result<(), crate::error::StreamError> {
	let recipients: Vec<String> = {
		let record = state
			.streams
			.get(stream_id)
			.ok_or_else(|| crate::error::StreamError::UnknownStream(stream_id.to_string()))?;
		if !record.is_open() {
			return Err(crate::error::StreamError::UnknownStream(stream_id.to_string()));
		}
		record.recipients_excluding(participant_id).map(String::from).collect()
	};
	let frame = crate::streams::encode_frame(stream_id, &payload);
	for pid in recipients {
		let Some(session_id) = state.live_session.get(&pid).cloned() else {
			continue;
		};
		if let Some(handle) = state.sessions.get_mut(&session_id) {
			let _ = handle.outbound_tx.try_send(Outbound::Binary(frame.clone()));
		}
	}
	Ok(())
}

/// Hands each delivery to its recipient's outbound queue. A `try_send`
/// failure (full queue) flags the session as a slow-consumer candidate
/// rather than dropping the message loudly — the actor reaps it on the
/// next heartbeat tick if it stays full past budget.
async fn deliver(state: &mut TopicState, outcome: router::RouteOutcome) {
	for (participant_id, envelope) in outcome.deliveries {
		let Some(session_id) = state.live_session.get(&participant_id).cloned() else {
			continue;
		};
		if let Some(handle) = state.sessions.get_mut(&session_id) {
			match handle.outbound_tx.try_send(Outbound::Envelope(envelope)) {
				Ok(()) => handle.flagged_slow_since = None,
				Err(_) => {
					handle.flagged_slow_since.get_or_insert(chrono::Utc::now());
				},
			}
		}
	}
}
