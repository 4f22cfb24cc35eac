//! The session layer — spec.md §4.3.
//!
//! Owns exactly one WebSocket connection: authenticates it against a
//! topic, pumps the topic's outbound queue to the socket, and parses
//! inbound frames before forwarding them to the topic actor. Holds no
//! topic state itself — only a [`TopicHandle`] (spec.md §9 arena
//! pattern: "sessions hold participant-id + topic-id handles, never
//! direct pointers").

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::envelope::{self, PROTOCOL_VERSION};
use crate::error::{AdmissionError, ErrorCode, RejectedResponse};
use crate::registry::TopicRegistry;
use crate::streams;
use crate::topic::{CloseReason, GATEWAY_SENDER, JoinOutcome, Outbound};

/// Drives one accepted WebSocket connection end to end. Returns once the
/// socket closes, the session is displaced, or it's evicted as a slow
/// consumer.
pub async fn run(socket: WebSocket, registry: &TopicRegistry, topic: String, token: String) {
	let topic_handle = registry.get_or_spawn(&topic);
	let session_id = mew_core::id::new_id();
	let (outbound_tx, mut outbound_rx) = mpsc::channel(256);
	let error_tx = outbound_tx.clone();

	let join_outcome = match topic_handle.join(token, session_id.clone(), outbound_tx).await {
		Ok(outcome) => outcome,
		Err(e) => {
			warn!(topic = %topic, error = %e, "topic actor unreachable during join");
			return;
		},
	};

	let (mut sink, mut stream) = socket.split();

	let welcome = match join_outcome {
		JoinOutcome::Welcome(envelope) => *envelope,
		JoinOutcome::Rejected(reason) => {
			let code = match &reason {
				crate::error::AuthError::MissingToken | crate::error::AuthError::InvalidToken => ErrorCode::UnknownParticipant,
				crate::error::AuthError::UnknownTopic(_) => ErrorCode::UnknownParticipant,
				crate::error::AuthError::TopicFull(_) => ErrorCode::Internal,
			};
			let body = serde_json::to_string(&RejectedResponse::new(code, reason.to_string())).unwrap_or_default();
			let _ = sink.send(Message::Text(body.into())).await;
			let _ = sink.close().await;
			return;
		},
	};
	let participant_id = welcome.to.first().cloned().unwrap_or_default();
	let welcome_text = String::from_utf8(envelope::serialize(&welcome)).unwrap_or_default();
	let _ = sink.send(Message::Text(welcome_text.into())).await;

	info!(topic = %topic, participant = %participant_id, session = %session_id, "session established");

	let egress = tokio::spawn(async move {
		while let Some(out) = outbound_rx.recv().await {
			match out {
				Outbound::Envelope(e) => {
					let text = String::from_utf8(envelope::serialize(&e)).unwrap_or_default();
					if sink.send(Message::Text(text.into())).await.is_err() {
						break;
					}
				},
				Outbound::Binary(frame) => {
					if sink.send(Message::Binary(frame.into())).await.is_err() {
						break;
					}
				},
				Outbound::Ping => {
					if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
						break;
					}
				},
				Outbound::Close(reason) => {
					let _ = sink.send(Message::Close(Some(axum::extract::ws::CloseFrame {
						code: close_code(reason),
						reason: reason.as_str().into(),
					}))).await;
					break;
				},
			}
		}
	});

	while let Some(Ok(msg)) = stream.next().await {
		match msg {
			Message::Text(text) => {
				match envelope::parse(text.as_bytes()) {
					Ok(parsed) => {
						topic_handle.ingress(session_id.clone(), participant_id.clone(), parsed).await;
					},
					Err(e) => {
						warn!(participant = %participant_id, error = %e, "malformed envelope");
						let err = AdmissionError::from(e);
						let notice = malformed_envelope_notice(&participant_id, err.code(), err.to_string());
						let _ = error_tx.send(Outbound::Envelope(notice)).await;
					},
				}
			},
			Message::Binary(bytes) => {
				if let Ok((stream_id, payload)) = streams::decode_frame(&bytes) {
					let _ = topic_handle.binary_frame(participant_id.clone(), stream_id.to_string(), payload.to_vec()).await;
				}
			},
			Message::Pong(_) => {
				topic_handle.pong(session_id.clone()).await;
			},
			Message::Ping(_) => {},
			Message::Close(_) => break,
		}
	}

	topic_handle.leave(session_id, participant_id).await;
	egress.abort();
}

/// A `system/error` for a frame that never made it into the admission
/// pipeline at all — it's handed straight to the session's own outbound
/// queue rather than through the topic actor, since a frame that didn't
/// parse has no sender identity for the topic to route a reply to
/// (spec.md §7: "Admission errors ... reported back to the sender via
/// `system/error` addressed to them").
fn malformed_envelope_notice(participant_id: &str, code: ErrorCode, detail: impl Into<String>) -> crate::envelope::Envelope {
	crate::envelope::Envelope {
		protocol: PROTOCOL_VERSION.to_string(),
		id: mew_core::id::new_id(),
		ts: Utc::now(),
		from: GATEWAY_SENDER.to_string(),
		to: vec![participant_id.to_string()],
		kind: "system/error".to_string(),
		correlation_id: vec![],
		context: None,
		payload: json!({ "error": code.as_str(), "detail": detail.into() }),
		extra: Default::default(),
	}
}

fn close_code(reason: CloseReason) -> u16 {
	match reason {
		CloseReason::DisplacedByNewer => 4001,
		CloseReason::SlowConsumer => 4002,
		CloseReason::SessionEnded => 1000,
		CloseReason::AuthFailed => 4003,
		CloseReason::PingTimeout => 4004,
	}
}
