//! The admission pipeline — spec.md §4.4.
//!
//! Everything here is `&mut TopicState` free functions rather than
//! methods on an actor: the actor (`topic::actor`) is the only thing
//! that ever calls in, one envelope at a time, off its single command
//! loop, so there is never real concurrency to reason about here — just
//! the seven steps in order.

use chrono::Utc;
use serde_json::{Value, json};

use crate::capability::{Rule, RuleSet};
use crate::envelope::{Envelope, EnvelopeIn, PROTOCOL_VERSION};
use crate::error::{AdmissionError, ErrorCode, GrantError};
use crate::grants::{Grant, Invite};
use crate::participant::{Participant, ParticipantKind, ParticipantStatus};
use crate::streams::{StreamDirection, StreamRecord};

use super::state::{CloseReason, GATEWAY_SENDER, Outbound, TopicState};

/// Well-known gateway-internal kinds dispatched to a handler at step 4
/// (spec.md §4.6, §4.7, §4.8). All of these still pass the ordinary
/// capability check at step 3 first — a participant must hold a rule for
/// e.g. `capability/grant-ack` like any other kind.
fn has_internal_handler(kind: &str) -> bool {
	matches!(
		kind,
		"capability/grant"
			| "capability/grant-ack"
			| "capability/revoke"
			| "space/invite"
			| "stream/request"
			| "stream/open"
			| "stream/close"
			| "system/ping"
	)
}

/// Outcome of routing one envelope: the set of `(participant_id,
/// envelope)` pairs the actor must hand to each recipient's outbound
/// queue, already expanded for fanout/observers.
#[derive(Clone)]
pub struct RouteOutcome {
	pub deliveries: Vec<(String, Envelope)>,
}

impl RouteOutcome {
	fn empty() -> Self {
		Self { deliveries: Vec::new() }
	}
}

/// [`admit`]'s result, carrying the stamped envelope id and whether it
/// passed admission — the HTTP injection endpoint needs both to answer
/// spec.md §4.8's `{status: "accepted", id}` / `{status: "rejected",
/// error}` contract; ordinary WebSocket ingress only needs `outcome`.
#[derive(Clone)]
pub struct AdmitResult {
	pub envelope_id: String,
	pub accepted: bool,
	pub outcome: RouteOutcome,
}

fn rejection_envelope(to: &str, code: ErrorCode, detail: impl Into<String>, correlates_with: &str) -> Envelope {
	Envelope {
		protocol: PROTOCOL_VERSION.to_string(),
		id: mew_core::id::new_id(),
		ts: Utc::now(),
		from: GATEWAY_SENDER.to_string(),
		to: vec![to.to_string()],
		kind: "system/error".to_string(),
		correlation_id: vec![correlates_with.to_string()],
		context: None,
		payload: json!({ "error": code.as_str(), "detail": detail.into() }),
		extra: Default::default(),
	}
}

/// Steps 1-7 of spec.md §4.4 for one participant-authored envelope.
///
/// `from` is the already-authenticated identity of the sending session
/// (the session layer never trusts an `EnvelopeIn.from` claim — spec.md
/// §4.3). Thin wrapper over [`admit_tracked`] for callers (ordinary
/// WebSocket ingress) that don't need the stamped id or accept/reject
/// verdict back.
pub fn admit(state: &mut TopicState, incoming: EnvelopeIn, from: &str) -> RouteOutcome {
	admit_tracked(state, incoming, from).outcome
}

/// Same admission pipeline as [`admit`], but also reports the stamped
/// envelope id and whether it was accepted — what the HTTP injection
/// endpoint needs to answer spec.md §4.8's `{status, id}` contract
/// (spec.md §8: "Injecting an envelope via HTTP is observationally
/// equivalent to sending it over WebSocket from the same participant").
pub fn admit_tracked(state: &mut TopicState, incoming: EnvelopeIn, from: &str) -> AdmitResult {
	let now = Utc::now();

	// Step 1: stamp id/ts/from.
	let mut envelope = incoming.stamp(from.to_string(), now);
	let envelope_id = envelope.id.clone();

	let topic_label = || crate::telemetry::TopicLabel { topic: state.name.clone() };
	let reject = |state: &mut TopicState, code: ErrorCode, detail: String| -> AdmitResult {
		state.metrics.envelopes_denied.get_or_create(&topic_label()).inc();
		let rejection = rejection_envelope(from, code, detail, &envelope_id);
		AdmitResult {
			envelope_id: envelope_id.clone(),
			accepted: false,
			outcome: RouteOutcome {
				deliveries: vec![(from.to_string(), rejection)],
			},
		}
	};

	// Rate limit, ahead of the numbered admission steps (SPEC_FULL.md §B):
	// a throttled sender never even reaches the protocol check.
	if !state.check_rate_limit(from, now) {
		let err = AdmissionError::RateLimited;
		return reject(state, err.code(), err.to_string());
	}

	// Step 2: protocol check.
	if envelope.protocol != PROTOCOL_VERSION {
		let err = AdmissionError::ProtocolMismatch(format!("expected `{PROTOCOL_VERSION}`, got `{}`", envelope.protocol));
		return reject(state, err.code(), err.to_string());
	}

	// Step 3: capability check, against the sender's effective rule set.
	let Some(sender) = state.participants.get(from) else {
		return reject(state, ErrorCode::UnknownParticipant, "sender is not a topic participant".to_string());
	};
	if !sender.effective_capabilities().allows(&envelope) {
		let err = AdmissionError::CapabilityViolation { kind: envelope.kind.clone() };
		let rules = serde_json::to_value(sender.effective_capabilities()).unwrap_or_else(|_| Value::Array(Vec::new()));
		state.metrics.envelopes_denied.get_or_create(&topic_label()).inc();
		let mut rejection = rejection_envelope(from, err.code(), err.to_string(), &envelope_id);
		if let Some(obj) = rejection.payload.as_object_mut() {
			obj.insert("rules".to_string(), rules);
		}
		return AdmitResult {
			envelope_id: envelope_id.clone(),
			accepted: false,
			outcome: RouteOutcome {
				deliveries: vec![(from.to_string(), rejection)],
			},
		};
	}
	state.metrics.envelopes_admitted.get_or_create(&topic_label()).inc();

	// Step 4: dispatch to an internal handler if this kind has
	// gateway-internal semantics. The handler may mutate state and may
	// return additional synthetic envelopes to splice in alongside the
	// original at step 5 (from = GATEWAY_SENDER, bypasses step 3).
	let mut synthetic = Vec::new();
	if has_internal_handler(&envelope.kind) {
		synthetic = dispatch_internal(state, &mut envelope, now);
	}

	// Step 5: append to history. The original envelope only — each
	// synthetic envelope is routed through admit_synthetic below, which
	// appends it at its own step 5 (spec.md §4.4 step 4: "each such
	// envelope is itself inserted at step 5").
	state.history.append(envelope.clone());

	// Step 6 + 7: compute recipients (addressed or broadcast) plus
	// observers, and enqueue.
	let mut outcome = RouteOutcome::empty();
	fan_out(state, &envelope, &mut outcome);
	for extra in synthetic {
		let extra_outcome = admit_synthetic(state, extra);
		outcome.deliveries.extend(extra_outcome.deliveries);
	}
	AdmitResult {
		envelope_id,
		accepted: true,
		outcome,
	}
}

fn fan_out(state: &TopicState, envelope: &Envelope, outcome: &mut RouteOutcome) {
	let recipients = state.addressed_or_broadcast_recipients(envelope);
	let observers = state.observers(envelope, &recipients);
	for pid in recipients.iter().chain(observers.iter()) {
		outcome.deliveries.push((pid.clone(), envelope.clone()));
	}
}

/// Injects an envelope directly, as if it arrived from a synthetic
/// gateway sender, skipping steps 1-3 entirely. Used for `system/welcome`
/// and presence (spec.md §4.4 step 4, §4.3).
pub fn admit_synthetic(state: &mut TopicState, envelope: Envelope) -> RouteOutcome {
	state.history.append(envelope.clone());
	let mut outcome = RouteOutcome::empty();
	fan_out(state, &envelope, &mut outcome);
	outcome
}

fn presence_envelope(participant_id: &str, event: &str) -> Envelope {
	Envelope {
		protocol: PROTOCOL_VERSION.to_string(),
		id: mew_core::id::new_id(),
		ts: Utc::now(),
		from: participant_id.to_string(),
		to: vec![],
		kind: "presence".to_string(),
		correlation_id: vec![],
		context: None,
		payload: json!({ "event": event, "participant": participant_id }),
		extra: Default::default(),
	}
}

/// Marks a participant present and returns the `presence` join envelope
/// to fan out (spec.md §4.3). Self-presence suppression falls out of
/// ordinary broadcast fanout, which already excludes `e.from`.
pub fn mark_joined(state: &mut TopicState, participant_id: &str) -> RouteOutcome {
	if let Some(p) = state.participants.get_mut(participant_id) {
		p.status = ParticipantStatus::Online;
		p.last_seen = Utc::now();
	}
	admit_synthetic(state, presence_envelope(participant_id, "join"))
}

pub fn mark_left(state: &mut TopicState, participant_id: &str) -> RouteOutcome {
	if let Some(p) = state.participants.get_mut(participant_id) {
		p.status = ParticipantStatus::Offline;
		p.last_seen = Utc::now();
	}
	state.live_session.remove(participant_id);
	let mut outcome = admit_synthetic(state, presence_envelope(participant_id, "leave"));
	for closed in close_owned_streams(state, participant_id) {
		let more = admit_synthetic(state, closed);
		outcome.deliveries.extend(more.deliveries);
	}
	outcome
}

/// The `presence` "leave" envelope alone, with no stream teardown and no
/// `live_session`/status bookkeeping — what a session displaced by a
/// newer one for the same participant needs (the participant is still
/// present under the new session; only the old session is going away).
fn mark_displaced(state: &mut TopicState, participant_id: &str) -> RouteOutcome {
	admit_synthetic(state, presence_envelope(participant_id, "leave"))
}

/// Terminates every stream owned by `participant_id` with a synthetic
/// `stream/close`, per spec.md §5 "On session close, all owned streams
/// are terminated with synthetic stream/close envelopes."
fn close_owned_streams(state: &mut TopicState, participant_id: &str) -> Vec<Envelope> {
	let owned: Vec<String> = state
		.streams
		.values()
		.filter(|s| s.owner == participant_id && s.is_open())
		.map(|s| s.stream_id.clone())
		.collect();
	let mut closes = Vec::new();
	for stream_id in owned {
		if let Some(record) = state.streams.get_mut(&stream_id) {
			record.close();
		}
		closes.push(Envelope {
			protocol: PROTOCOL_VERSION.to_string(),
			id: mew_core::id::new_id(),
			ts: Utc::now(),
			from: GATEWAY_SENDER.to_string(),
			to: vec![],
			kind: "stream/close".to_string(),
			correlation_id: vec![],
			context: None,
			payload: json!({ "stream_id": stream_id, "reason": "owner_disconnected" }),
			extra: Default::default(),
		});
	}
	closes
}

pub fn heartbeat(state: &mut TopicState, participant_id: &str) -> RouteOutcome {
	admit_synthetic(state, presence_envelope(participant_id, "heartbeat"))
}

/// Assembles the `system/welcome` envelope for a freshly-joined session
/// (spec.md §4.4: roster + bounded history + the joiner's own effective
/// capabilities).
pub fn welcome_envelope(state: &TopicState, participant_id: &str) -> Option<Envelope> {
	let you = state.participants.get(participant_id)?.summary();
	let history = state
		.history
		.snapshot()
		.into_iter()
		.rev()
		.take(state.config.welcome_history_limit)
		.rev()
		.collect::<Vec<_>>();
	let payload = super::state::WelcomePayload {
		you,
		participants: state.roster(),
		history,
		capabilities: super::state::WelcomeCapabilities {
			history: super::state::HistoryHint {
				enabled: true,
				limit: state.config.welcome_history_limit,
			},
		},
	};
	Some(Envelope {
		protocol: PROTOCOL_VERSION.to_string(),
		id: mew_core::id::new_id(),
		ts: Utc::now(),
		from: GATEWAY_SENDER.to_string(),
		to: vec![participant_id.to_string()],
		kind: "system/welcome".to_string(),
		correlation_id: vec![],
		context: None,
		payload: serde_json::to_value(payload).unwrap_or(Value::Null),
		extra: Default::default(),
	})
}

/// Step-4 internal handler dispatch. Returns synthetic envelopes the
/// caller should fan out alongside the admitted one.
fn dispatch_internal(state: &mut TopicState, envelope: &mut Envelope, now: chrono::DateTime<Utc>) -> Vec<Envelope> {
	match envelope.kind.as_str() {
		"capability/grant" => handle_grant(state, envelope, now),
		"capability/grant-ack" => handle_grant_ack(state, envelope),
		"capability/revoke" => handle_revoke(state, envelope),
		"space/invite" => handle_invite(state, envelope),
		"stream/request" => handle_stream_request(state, envelope, now),
		"stream/open" => handle_stream_open(state, envelope),
		"stream/close" => handle_stream_close(state, envelope),
		"system/ping" => vec![handle_system_ping(envelope)],
		_ => Vec::new(),
	}
}

/// Protocol-level liveness echo (spec.md §6 lists `system/ping`/
/// `system/pong` among the gateway's well-known kinds; distinct from the
/// transport-level WebSocket ping of spec.md §4.3). The gateway answers
/// immediately with a `system/pong` addressed only to the sender,
/// correlating the ping's id.
fn handle_system_ping(envelope: &Envelope) -> Envelope {
	Envelope {
		protocol: PROTOCOL_VERSION.to_string(),
		id: mew_core::id::new_id(),
		ts: Utc::now(),
		from: GATEWAY_SENDER.to_string(),
		to: vec![envelope.from.clone()],
		kind: "system/pong".to_string(),
		correlation_id: vec![envelope.id.clone()],
		context: None,
		payload: json!({}),
		extra: Default::default(),
	}
}

/// Parses `value[key]` as a capability rule list. A key that is absent
/// yields an empty set; a key that is present but fails to parse, or
/// whose rules include an empty `kind` pattern, is rejected outright
/// rather than silently treated as empty (spec.md §4.2: a capability
/// rule is a structural pattern, not a best-effort hint).
fn validated_rule_set(value: &Value, key: &str) -> Result<RuleSet, GrantError> {
	let Some(raw) = value.get(key) else {
		return Ok(RuleSet::empty());
	};
	let rules: Vec<Rule> = serde_json::from_value(raw.clone()).map_err(|e| GrantError::InvalidCapability(format!("`{key}`: {e}")))?;
	if rules.iter().any(|r| r.kind.is_empty()) {
		return Err(GrantError::InvalidCapability(format!("`{key}` contains a rule with an empty kind pattern")));
	}
	Ok(RuleSet::new(rules))
}

/// The recipient of a `capability/grant` or `capability/revoke`: spec.md
/// §4.6 documents both as carrying `payload.recipient` as the addressing
/// field, so that's the source of truth. `to` is accepted as a fallback
/// for a sender that addresses the envelope directly instead, but a
/// `payload.recipient` always wins when present.
fn grant_recipient(envelope: &Envelope) -> Option<String> {
	envelope
		.payload
		.get("recipient")
		.and_then(Value::as_str)
		.map(String::from)
		.or_else(|| envelope.to.first().cloned())
}

fn handle_grant(state: &mut TopicState, envelope: &Envelope, now: chrono::DateTime<Utc>) -> Vec<Envelope> {
	let Some(recipient) = grant_recipient(envelope) else {
		return Vec::new();
	};
	if !state.participants.contains_key(&recipient) {
		return vec![rejection_envelope(
			&envelope.from,
			ErrorCode::UnknownParticipant,
			format!("no such participant `{recipient}`"),
			&envelope.id,
		)];
	}
	let capabilities = match validated_rule_set(&envelope.payload, "capabilities") {
		Ok(rules) => rules,
		Err(err) => return vec![rejection_envelope(&envelope.from, err.code(), err.to_string(), &envelope.id)],
	};
	let reason = envelope.payload.get("reason").and_then(Value::as_str).map(String::from);
	let mut grant = Grant::new(envelope.id.clone(), recipient.clone(), envelope.from.clone(), capabilities, reason);
	if let Some(expires_at) = envelope.payload.get("expires_at").and_then(Value::as_str).and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()) {
		grant.expires_at = Some(expires_at.with_timezone(&Utc));
	} else if let Some(secs) = envelope.payload.get("expiresInSecs").and_then(Value::as_i64) {
		// Convenience field, not part of the documented wire contract:
		// `expires_at` (an absolute instant) is the source of truth above.
		grant.expires_at = Some(now + chrono::Duration::seconds(secs));
	}
	state.pending_grants.insert(grant.id.clone(), grant.clone());
	if let Some(p) = state.participants.get_mut(&recipient) {
		p.grants.push(grant);
	}
	state.metrics.grants_outstanding.set(state.pending_grants.len() as i64);
	Vec::new()
}

/// Validates and applies a `capability/grant-ack` (spec.md §4.6 "Critical
/// integrity rule"). A mismatched `from` is rejected as a capability
/// violation rather than silently dropped, per §7 "Protocol errors from
/// participants ... treated as capability_violation". A double-ack (no
/// pending grant left in that state) is a silent no-op, per §8.
fn handle_grant_ack(state: &mut TopicState, envelope: &Envelope) -> Vec<Envelope> {
	let Some(grant_id) = envelope.payload.get("grantId").and_then(Value::as_str).map(String::from) else {
		return Vec::new();
	};
	let Some(grant) = state.pending_grants.get(&grant_id).cloned() else {
		return Vec::new();
	};
	if let Err(err) = grant.validate_ack(&envelope.from, &envelope.correlation_id) {
		return match err {
			crate::error::GrantError::UnknownGrant(_) => Vec::new(),
			_ => vec![rejection_envelope(&envelope.from, ErrorCode::CapabilityViolation, err.to_string(), &envelope.id)],
		};
	}
	if let Some(p) = state.participants.get_mut(&grant.recipient) {
		for g in p.grants.iter_mut() {
			if g.id == grant.id {
				g.status = crate::grants::GrantStatus::Active;
			}
		}
	}
	if let Some(g) = state.pending_grants.get_mut(&grant_id) {
		g.status = crate::grants::GrantStatus::Active;
	}
	Vec::new()
}

fn handle_revoke(state: &mut TopicState, envelope: &Envelope) -> Vec<Envelope> {
	let Some(recipient) = grant_recipient(envelope) else {
		return Vec::new();
	};
	let patterns: Vec<Rule> = envelope
		.payload
		.get("capabilities")
		.and_then(|v| serde_json::from_value(v.clone()).ok())
		.unwrap_or_default();
	if let Some(p) = state.participants.get_mut(&recipient) {
		p.base_capabilities.remove_conflicting(&patterns);
		for g in p.grants.iter_mut() {
			g.capabilities.remove_conflicting(&patterns);
		}
	}
	Vec::new()
}

/// `space/invite` (spec.md §4.6, §8 S5): creates the new participant row,
/// mints an opaque token, and returns two synthetic envelopes — an
/// `invite-ack` addressed only to the inviter carrying the token, and a
/// topic-wide `presence` "invited" event that omits it (invariants 6, 7
/// in spec.md §8). A duplicate participant id never regenerates a token;
/// it gets an `already_exists` rejection back to the inviter instead.
fn handle_invite(state: &mut TopicState, envelope: &Envelope) -> Vec<Envelope> {
	let Some(new_id) = envelope.payload.get("participantId").and_then(Value::as_str) else {
		return Vec::new();
	};
	if state.participants.contains_key(new_id) {
		return vec![rejection_envelope(
			&envelope.from,
			ErrorCode::AlreadyExists,
			format!("participant `{new_id}` already exists"),
			&envelope.id,
		)];
	}
	let name = envelope
		.payload
		.get("name")
		.and_then(Value::as_str)
		.unwrap_or(new_id)
		.to_string();
	let kind = envelope
		.payload
		.get("kind")
		.and_then(Value::as_str)
		.map(ParticipantKind::from)
		.unwrap_or(ParticipantKind::Agent);
	let initial = match validated_rule_set(&envelope.payload, "initialCapabilities") {
		Ok(rules) => rules,
		Err(err) => return vec![rejection_envelope(&envelope.from, err.code(), err.to_string(), &envelope.id)],
	};
	let extra = match validated_rule_set(&envelope.payload, "capabilities") {
		Ok(rules) => rules,
		Err(err) => return vec![rejection_envelope(&envelope.from, err.code(), err.to_string(), &envelope.id)],
	};
	let capabilities = initial.union(&extra);
	let invite = Invite::new(new_id, capabilities.clone(), envelope.from.clone());
	let mut participant = Participant::new(new_id, name, kind, capabilities);
	participant.tokens.insert(invite.token.clone());
	state.participants.insert(new_id.to_string(), participant);

	let invite_ack = Envelope {
		protocol: PROTOCOL_VERSION.to_string(),
		id: mew_core::id::new_id(),
		ts: Utc::now(),
		from: GATEWAY_SENDER.to_string(),
		to: vec![envelope.from.clone()],
		kind: "space/invite-ack".to_string(),
		correlation_id: vec![envelope.id.clone()],
		context: None,
		payload: json!({ "participant_id": new_id, "token": invite.token }),
		extra: Default::default(),
	};
	let invited_presence = Envelope {
		protocol: PROTOCOL_VERSION.to_string(),
		id: mew_core::id::new_id(),
		ts: Utc::now(),
		from: GATEWAY_SENDER.to_string(),
		to: vec![],
		kind: "presence".to_string(),
		correlation_id: vec![],
		context: None,
		payload: json!({ "event": "invited", "participant_id": new_id, "invited_by": envelope.from }),
		extra: Default::default(),
	};
	vec![invite_ack, invited_presence]
}

/// Mints the stream id and stamps it back into the request envelope's
/// payload (spec.md §4.7 step 1-2: the opening side's `stream/open` must
/// correlate a `stream_id` it learned from somewhere — here, from the
/// forwarded `stream/request` itself — since nothing else ever tells it
/// what id the gateway picked).
fn handle_stream_request(state: &mut TopicState, envelope: &mut Envelope, _now: chrono::DateTime<Utc>) -> Vec<Envelope> {
	let direction = match envelope.payload.get("direction").and_then(Value::as_str) {
		Some("upload") => StreamDirection::Upload,
		_ => StreamDirection::Download,
	};
	let participants = envelope.to.clone();
	let description = envelope.payload.get("description").and_then(Value::as_str).map(String::from);
	let stream_id = mew_core::id::new_id();
	let record = StreamRecord::new(stream_id.clone(), direction, envelope.from.clone(), participants, description);
	state.streams.insert(record.stream_id.clone(), record);
	if let Some(obj) = envelope.payload.as_object_mut() {
		obj.insert("stream_id".to_string(), Value::String(stream_id));
	}
	Vec::new()
}

fn handle_stream_open(state: &mut TopicState, envelope: &Envelope) -> Vec<Envelope> {
	if let Some(stream_id) = envelope.payload.get("stream_id").and_then(Value::as_str)
		&& let Some(record) = state.streams.get_mut(stream_id)
	{
		record.open();
	}
	Vec::new()
}

fn handle_stream_close(state: &mut TopicState, envelope: &Envelope) -> Vec<Envelope> {
	if let Some(stream_id) = envelope.payload.get("stream_id").and_then(Value::as_str)
		&& let Some(record) = state.streams.get_mut(stream_id)
	{
		record.close();
	}
	Vec::new()
}

/// Silently expires any `pending_ack` grant older than the topic's
/// `grant_ack_timeout` (spec.md §4.6 step 4: "the grantor MAY re-issue").
/// No envelope is emitted — expiration is observable only by the
/// permission never becoming active.
pub fn expire_stale_grants(state: &mut TopicState) {
	let now = Utc::now();
	let timeout = chrono::Duration::from_std(state.config.grant_ack_timeout).unwrap_or_default();
	let stale: Vec<String> = state
		.pending_grants
		.values()
		.filter(|g| g.status == crate::grants::GrantStatus::PendingAck && now - g.created_at > timeout)
		.map(|g| g.id.clone())
		.collect();
	for grant_id in stale {
		if let Some(grant) = state.pending_grants.get_mut(&grant_id) {
			grant.status = crate::grants::GrantStatus::Expired;
		}
		if let Some(grant) = state.pending_grants.get(&grant_id).cloned()
			&& let Some(p) = state.participants.get_mut(&grant.recipient)
		{
			p.grants.retain(|g| g.id != grant_id);
		}
		state.pending_grants.remove(&grant_id);
	}
	state.metrics.grants_outstanding.set(state.pending_grants.len() as i64);
}

/// Drops any stream still `requested` past the topic's
/// `stream_open_timeout` (spec.md §5 "Stream requests have an open
/// timeout").
pub fn expire_stale_streams(state: &mut TopicState) {
	let now = Utc::now();
	let timeout = chrono::Duration::from_std(state.config.stream_open_timeout).unwrap_or_default();
	state.streams.retain(|_, record| {
		!(matches!(record.state, crate::streams::StreamState::Requested) && now - record.opened_at > timeout)
	});
}

/// Picks recipients for a close/eviction signal: every currently-connected
/// session for `participant_id`.
pub fn sessions_for(state: &TopicState, participant_id: &str) -> Vec<String> {
	state
		.sessions
		.iter()
		.filter(|(_, h)| h.participant_id == participant_id)
		.map(|(sid, _)| sid.clone())
		.collect()
}

/// Sends a close signal to every existing session of `participant_id`
/// before a new one takes over, and returns the synthetic `presence/leave`
/// for the old session (spec.md §4.3 "displaced by newer": "the Router
/// emits one `presence/leave` for the old, one `presence/join` for the
/// new"). `do_leave` cannot produce this leave itself: by the time it
/// runs for the stale session, `live_session` has already been overwritten
/// by the new join, so it bails out early as a no-op.
pub async fn displace_existing_sessions(state: &mut TopicState, participant_id: &str) -> RouteOutcome {
	let stale: Vec<String> = sessions_for(state, participant_id);
	if stale.is_empty() {
		return RouteOutcome::empty();
	}
	for sid in &stale {
		if let Some(handle) = state.sessions.remove(sid) {
			super::actor::sync_active_sessions_gauge(state);
			let _ = handle.outbound_tx.send(Outbound::Close(CloseReason::DisplacedByNewer)).await;
		}
	}
	mark_displaced(state, participant_id)
}
