//! The stream subsystem — spec.md §4.7.
//!
//! Envelope traffic (`stream/request`, `stream/open`, `stream/close`)
//! orchestrates; binary frames carry bulk data. This gateway picks the
//! length-prefix + stream-id header framing spec.md §6 calls out as the
//! reference choice: each binary WebSocket frame is
//!
//! ```text
//! | u32 big-endian stream_id_len | stream_id bytes (utf8) | payload bytes |
//! ```
//!
//! forwarded verbatim after the header is stripped — the router never
//! interprets the payload (spec.md §4.7: "Binary framing is opaque to the
//! router").

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StreamError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamDirection {
	Upload,
	Download,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
	Requested,
	Open,
	Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRecord {
	pub stream_id: String,
	pub direction: StreamDirection,
	pub owner: String,
	pub participants: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub state: StreamState,
	pub opened_at: DateTime<Utc>,
}

impl StreamRecord {
	pub fn new(stream_id: impl Into<String>, direction: StreamDirection, owner: impl Into<String>, participants: Vec<String>, description: Option<String>) -> Self {
		Self {
			stream_id: stream_id.into(),
			direction,
			owner: owner.into(),
			participants,
			description,
			state: StreamState::Requested,
			opened_at: Utc::now(),
		}
	}

	pub fn open(&mut self) {
		self.state = StreamState::Open;
	}

	pub fn close(&mut self) {
		self.state = StreamState::Closed;
	}

	/// The set of sessions a binary frame on this stream must be forwarded
	/// to: every participant but the sender (spec.md §4.7 step 3).
	pub fn recipients_excluding<'a>(&'a self, sender: &'a str) -> impl Iterator<Item = &'a str> {
		self
			.participants
			.iter()
			.map(String::as_str)
			.chain(std::iter::once(self.owner.as_str()))
			.filter(move |p| *p != sender)
	}

	pub fn is_open(&self) -> bool {
		matches!(self.state, StreamState::Open)
	}
}

/// Wire header for a binary stream frame: `<4-byte BE len><stream_id
/// bytes><payload>`.
pub fn encode_frame(stream_id: &str, payload: &[u8]) -> Vec<u8> {
	let id_bytes = stream_id.as_bytes();
	let mut out = BytesMut::with_capacity(4 + id_bytes.len() + payload.len());
	out.put_u32(id_bytes.len() as u32);
	out.put_slice(id_bytes);
	out.put_slice(payload);
	out.to_vec()
}

/// Splits a binary frame into `(stream_id, payload)`. Frames too short to
/// contain a valid header are rejected; this is the only shape validation
/// the router performs — the payload itself is never inspected.
pub fn decode_frame(frame: &[u8]) -> Result<(&str, &[u8]), StreamError> {
	let mut buf = frame;
	if buf.remaining() < 4 {
		return Err(StreamError::UnknownStream(String::new()));
	}
	let len = buf.get_u32() as usize;
	if buf.remaining() < len {
		return Err(StreamError::UnknownStream(String::new()));
	}
	let id = std::str::from_utf8(&buf[..len]).map_err(|_| StreamError::UnknownStream(String::new()))?;
	buf.advance(len);
	Ok((id, buf))
}
