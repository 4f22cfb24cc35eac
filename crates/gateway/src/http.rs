//! The HTTP admin surface — spec.md §4.8.
//!
//! A thin `axum` router in front of the same [`TopicRegistry`] the
//! WebSocket session layer uses: every endpoint here either reads topic
//! state through a [`crate::topic::TopicHandle`] or, for message
//! injection, drives the identical admission pipeline a WebSocket
//! envelope would (spec.md §8: "Injecting an envelope via HTTP is
//! observationally equivalent to sending it over WebSocket from the same
//! participant").

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::envelope::{self, PROTOCOL_VERSION};
use crate::error::{ErrorCode, RejectedResponse};
use crate::history::HistoryQuery;
use crate::registry::TopicRegistry;

#[derive(Clone)]
pub struct AppState {
	pub registry: Arc<TopicRegistry>,
}

/// Builds the full admin + WebSocket router (spec.md §4.8 endpoint list).
pub fn router(state: AppState) -> Router {
	let cors = cors_layer(&state.registry.config().allowed_origins);
	Router::new()
		.route("/health", get(health))
		.route("/metrics", get(metrics))
		.route("/v0/auth/token", post(mint_dev_token))
		.route("/v0/topics/{topic}/participants", get(list_participants))
		.route("/v0/topics/{topic}/history", get(topic_history))
		.route("/participants/{pid}/messages", post(inject_message))
		.route("/v0/ws", get(ws_upgrade))
		.route("/ws", get(ws_upgrade))
		.layer(cors)
		.with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
	if allowed_origins.is_empty() {
		CorsLayer::new()
	} else {
		let origins: Vec<_> = allowed_origins
			.iter()
			.filter_map(|o| o.parse().ok())
			.collect();
		CorsLayer::new().allow_origin(AllowOrigin::list(origins))
	}
}

async fn health() -> impl IntoResponse {
	Json(json!({ "status": "ok" }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
	(
		[("content-type", "text/plain; version=0.0.4")],
		state.registry.metrics().encode(),
	)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
	headers
		.get(axum::http::header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Bearer "))
		.map(str::to_string)
}

fn rejected(status: StatusCode, code: ErrorCode, detail: impl Into<String>) -> Response {
	(status, Json(RejectedResponse::new(code, Some(detail.into())))).into_response()
}

/// Authenticates `headers`' bearer token against `topic`'s live
/// participant table (spec.md §4.8: "all require bearer auth except
/// health"). Any participant token valid in the topic authorizes reads;
/// callers that need per-participant scoping (message injection) check
/// the path parameter separately.
async fn authenticate(registry: &TopicRegistry, topic: &str, headers: &HeaderMap) -> Result<(), Response> {
	let Some(token) = bearer_token(headers) else {
		return Err(rejected(StatusCode::UNAUTHORIZED, ErrorCode::UnknownParticipant, "missing bearer token"));
	};
	let Some(handle) = registry.existing(topic) else {
		return Err(rejected(StatusCode::NOT_FOUND, ErrorCode::UnknownParticipant, format!("unknown topic `{topic}`")));
	};
	let roster = handle.roster().await.unwrap_or_default();
	// The roster summary never carries tokens (spec.md §4.4); the
	// participant's accepted token set lives only in the topic actor, so
	// we ask it to authenticate directly instead of re-deriving here.
	if handle.authenticate(token).await.unwrap_or(false) {
		Ok(())
	} else {
		drop(roster);
		Err(rejected(StatusCode::UNAUTHORIZED, ErrorCode::UnknownParticipant, "token not recognized for this topic"))
	}
}

#[derive(Debug, Deserialize)]
struct MintTokenRequest {
	topic: String,
	participant_id: String,
	#[serde(default)]
	name: Option<String>,
	#[serde(default)]
	kind: Option<String>,
}

/// `POST /v0/auth/token` — dev-only convenience endpoint, disabled
/// whenever `production_mode` is set (spec.md §4.8). Still subject to
/// spec.md §4.8's "all require bearer auth except health" like every
/// other admin endpoint in this file — "dev only, optional" describes
/// when the endpoint exists, not an auth exemption — so it's gated on
/// the configured `admin_token` the same way the others gate on a
/// participant's token.
async fn mint_dev_token(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<MintTokenRequest>) -> Response {
	if !state.registry.config().dev_auth_token_enabled() {
		return rejected(StatusCode::NOT_FOUND, ErrorCode::Internal, "dev token endpoint is disabled in production mode");
	}
	let Some(token) = bearer_token(&headers) else {
		return rejected(StatusCode::UNAUTHORIZED, ErrorCode::UnknownParticipant, "missing bearer token");
	};
	if !state.registry.config().authenticate_admin(&token) {
		return rejected(StatusCode::UNAUTHORIZED, ErrorCode::UnknownParticipant, "admin token not recognized");
	}
	let handle = state.registry.get_or_spawn(&req.topic);
	match handle.mint_dev_token(req.participant_id.clone(), req.name, req.kind).await {
		Ok(Ok(token)) => Json(json!({ "status": "created", "token": token, "participant_id": req.participant_id })).into_response(),
		Ok(Err(e)) => rejected(StatusCode::CONFLICT, e.code(), e.to_string()),
		Err(e) => {
			warn!(error = %e, "dev token mint failed");
			rejected(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal, "topic actor unavailable")
		},
	}
}

async fn list_participants(State(state): State<AppState>, Path(topic): Path<String>, headers: HeaderMap) -> Response {
	if let Err(resp) = authenticate(&state.registry, &topic, &headers).await {
		return resp;
	}
	let Some(handle) = state.registry.existing(&topic) else {
		return rejected(StatusCode::NOT_FOUND, ErrorCode::UnknownParticipant, format!("unknown topic `{topic}`"));
	};
	let roster = handle.roster().await.unwrap_or_default();
	Json(json!({ "participants": roster })).into_response()
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
	#[serde(default = "default_history_limit")]
	limit: usize,
	before: Option<String>,
}

fn default_history_limit() -> usize {
	100
}

async fn topic_history(State(state): State<AppState>, Path(topic): Path<String>, Query(params): Query<HistoryParams>, headers: HeaderMap) -> Response {
	if let Err(resp) = authenticate(&state.registry, &topic, &headers).await {
		return resp;
	}
	let Some(handle) = state.registry.existing(&topic) else {
		return rejected(StatusCode::NOT_FOUND, ErrorCode::UnknownParticipant, format!("unknown topic `{topic}`"));
	};
	let query = HistoryQuery {
		limit: params.limit,
		before_id: params.before,
		before_ts: None,
		context: None,
	};
	let history = handle.history(query).await.unwrap_or_default();
	Json(json!({ "history": history })).into_response()
}

#[derive(Debug, Deserialize)]
struct InjectQuery {
	space: String,
}

/// `POST /participants/{pid}/messages?space=...` — injects `body` through
/// the exact same admission pipeline a WebSocket envelope from `pid`
/// would take (spec.md §4.8, §8 round-trip law).
async fn inject_message(State(state): State<AppState>, Path(pid): Path<String>, Query(q): Query<InjectQuery>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
	if let Err(resp) = authenticate(&state.registry, &q.space, &headers).await {
		return resp;
	}
	let handle = state.registry.get_or_spawn(&q.space);
	let parsed = match envelope::parse(&body) {
		Ok(parsed) => parsed,
		Err(e) => {
			return rejected(StatusCode::BAD_REQUEST, ErrorCode::MalformedEnvelope, e.to_string());
		},
	};
	if parsed.protocol != PROTOCOL_VERSION {
		return rejected(
			StatusCode::BAD_REQUEST,
			ErrorCode::ProtocolVersionMismatch,
			format!("expected `{PROTOCOL_VERSION}`, got `{}`", parsed.protocol),
		);
	}
	match handle.inject(pid, parsed).await {
		Ok(result) if result.accepted => Json(json!({ "status": "accepted", "id": result.envelope_id })).into_response(),
		Ok(result) => {
			let detail = result.outcome.deliveries.first().map(|(_, e)| e.payload.clone());
			let error = detail
				.as_ref()
				.and_then(|p| p.get("error"))
				.and_then(|v| v.as_str())
				.unwrap_or("capability_violation")
				.to_string();
			(StatusCode::BAD_REQUEST, Json(json!({ "status": "rejected", "error": error, "id": result.envelope_id }))).into_response()
		},
		Err(e) => {
			warn!(error = %e, "message injection failed");
			rejected(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal, "topic actor unavailable")
		},
	}
}

#[derive(Debug, Deserialize)]
struct WsQuery {
	space: String,
	#[serde(default)]
	token: Option<String>,
}

/// `GET /v0/ws?space={topic}` (also served at `/ws`) — the primary
/// session endpoint (spec.md §4.8, §6). Accepts the bearer token either
/// as a header (native clients) or a `token=` query parameter (browser
/// WebSocket clients can't set headers).
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>, Query(q): Query<WsQuery>, headers: HeaderMap) -> Response {
	let token = q.token.or_else(|| bearer_token(&headers)).unwrap_or_default();
	ws.on_upgrade(move |socket| async move {
		crate::session::run(socket, &state.registry, q.space, token).await;
	})
}

/// Thin wrapper so handlers can return `axum::Json` without importing it
/// at every call site under a different alias — kept local because
/// `axum::Json`'s blanket `IntoResponse` already does everything needed;
/// this purely shortens the import list above.
type Json<T> = axum::Json<T>;
