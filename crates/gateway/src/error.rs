use serde::Serialize;
use thiserror::Error;

/// Stable wire error codes, spec.md §6/§7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
	CapabilityViolation,
	ProtocolVersionMismatch,
	UnknownParticipant,
	AlreadyExists,
	MalformedEnvelope,
	RateLimited,
	SlowConsumer,
	Internal,
}

impl ErrorCode {
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorCode::CapabilityViolation => "capability_violation",
			ErrorCode::ProtocolVersionMismatch => "protocol_version_mismatch",
			ErrorCode::UnknownParticipant => "unknown_participant",
			ErrorCode::AlreadyExists => "already_exists",
			ErrorCode::MalformedEnvelope => "malformed_envelope",
			ErrorCode::RateLimited => "rate_limited",
			ErrorCode::SlowConsumer => "slow_consumer",
			ErrorCode::Internal => "internal",
		}
	}
}

/// Codec-level failures — spec.md §4.1: "rejects input that is not a
/// single JSON object, lacks a recognized protocol, or has fields of
/// wrong semantic type".
#[derive(Debug, Error)]
pub enum ParseError {
	#[error("body is not a single JSON object")]
	NotAnObject,
	#[error("missing required field `{0}`")]
	MissingField(&'static str),
	#[error("field `{field}` has the wrong type: {detail}")]
	WrongType { field: &'static str, detail: String },
	#[error("invalid JSON: {0}")]
	Json(#[from] serde_json::Error),
}

impl ParseError {
	pub fn code(&self) -> ErrorCode {
		ErrorCode::MalformedEnvelope
	}
}

/// Authentication failures at WebSocket accept time (spec.md §4.3).
#[derive(Debug, Error)]
pub enum AuthError {
	#[error("missing bearer token")]
	MissingToken,
	#[error("token not recognized for this topic")]
	InvalidToken,
	#[error("unknown topic `{0}`")]
	UnknownTopic(String),
	#[error("topic `{0}` is at capacity")]
	TopicFull(String),
}

/// Per-envelope admission failures (spec.md §7 "Admission errors").
/// These never escalate beyond the offending session: the caller turns
/// one into a `system/error` envelope addressed back to the sender.
#[derive(Debug, Error)]
pub enum AdmissionError {
	#[error("protocol version mismatch: {0}")]
	ProtocolMismatch(String),
	#[error("capability violation for kind `{kind}`")]
	CapabilityViolation { kind: String },
	#[error(transparent)]
	Malformed(#[from] ParseError),
	#[error("rate limit exceeded")]
	RateLimited,
}

impl AdmissionError {
	pub fn code(&self) -> ErrorCode {
		match self {
			AdmissionError::ProtocolMismatch(_) => ErrorCode::ProtocolVersionMismatch,
			AdmissionError::CapabilityViolation { .. } => ErrorCode::CapabilityViolation,
			AdmissionError::Malformed(_) => ErrorCode::MalformedEnvelope,
			AdmissionError::RateLimited => ErrorCode::RateLimited,
		}
	}
}

/// Capability-engine failures: grant issuance, ack, revoke, invite
/// (spec.md §4.6).
#[derive(Debug, Error)]
pub enum GrantError {
	#[error("no pending grant with id `{0}`")]
	UnknownGrant(String),
	#[error("grant-ack `from` does not match the grant recipient")]
	AckFromMismatch,
	#[error("participant `{0}` already exists")]
	AlreadyExists(String),
	#[error("invalid capability pattern: {0}")]
	InvalidCapability(String),
}

impl GrantError {
	pub fn code(&self) -> ErrorCode {
		match self {
			GrantError::AlreadyExists(_) => ErrorCode::AlreadyExists,
			GrantError::AckFromMismatch => ErrorCode::CapabilityViolation,
			GrantError::UnknownGrant(_) => ErrorCode::CapabilityViolation,
			GrantError::InvalidCapability(_) => ErrorCode::MalformedEnvelope,
		}
	}
}

/// Stream lifecycle failures (spec.md §4.7).
#[derive(Debug, Error)]
pub enum StreamError {
	#[error("unknown or closed stream `{0}`")]
	UnknownStream(String),
	#[error("stream open timed out")]
	OpenTimeout,
}

/// The REST/WS-uniform rejection envelope, spec.md §6: `{status:
/// "rejected", error: "<code>", detail?: "<string>"}`.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedResponse {
	pub status: &'static str,
	pub error: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
}

impl RejectedResponse {
	pub fn new(code: ErrorCode, detail: impl Into<Option<String>>) -> Self {
		Self {
			status: "rejected",
			error: code.as_str(),
			detail: detail.into(),
		}
	}
}
