//! The envelope schema and wire codec — spec.md §3, §4.1.
//!
//! `Envelope` is the fully-stamped, routable form: every gateway-owned
//! field (`id`, `ts`, `from`) is populated. `EnvelopeIn` is what the codec
//! actually parses off the wire — those three fields start optional
//! because the admission pipeline (spec.md §4.4 step 1) is the thing that
//! fills them in, not the codec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseError;

pub const PROTOCOL_VERSION: &str = "mew/v0.4";

/// A fully-stamped envelope, eligible for admission, history, and
/// delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
	pub protocol: String,
	pub id: String,
	pub ts: DateTime<Utc>,
	pub from: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub to: Vec<String>,
	pub kind: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub correlation_id: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub context: Option<String>,
	#[serde(default)]
	pub payload: Value,
	/// Unknown fields, preserved verbatim through round-trip (spec.md §8:
	/// "preserving unknown fields").
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl Envelope {
	/// Approximate serialized size, used by the history ring's byte budget
	/// (spec.md §4.5).
	pub fn approx_size(&self) -> usize {
		serde_json::to_vec(self).map(|b| b.len()).unwrap_or(0)
	}

	pub fn is_broadcast(&self) -> bool {
		self.to.is_empty()
	}
}

/// The as-parsed, not-yet-admitted form. `id`/`ts`/`from` are producer
/// claims the gateway will verify or overwrite, never trust outright.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeIn {
	pub protocol: String,
	#[serde(default)]
	pub id: Option<String>,
	#[serde(default)]
	pub ts: Option<DateTime<Utc>>,
	#[serde(default)]
	pub from: Option<String>,
	#[serde(default)]
	pub to: Vec<String>,
	pub kind: String,
	#[serde(default)]
	pub correlation_id: Vec<String>,
	#[serde(default)]
	pub context: Option<String>,
	#[serde(default)]
	pub payload: Value,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl EnvelopeIn {
	/// Stamps `from`, assigns `id` if absent, and normalizes `ts` against
	/// `now` if absent or skewed beyond tolerance — spec.md §4.4 step 1.
	pub fn stamp(self, from: String, now: DateTime<Utc>) -> Envelope {
		let id = self.id.unwrap_or_else(mew_core::id::new_id);
		let ts = match self.ts {
			Some(ts) if mew_core::time::within_tolerance(ts, now) => ts,
			_ => now,
		};
		Envelope {
			protocol: self.protocol,
			id,
			ts,
			from,
			to: self.to,
			kind: self.kind,
			correlation_id: self.correlation_id,
			context: self.context,
			payload: self.payload,
			extra: self.extra,
		}
	}
}

/// Parses `bytes` as a single JSON object representing an envelope.
///
/// Rejects anything that isn't a JSON object, is missing `kind`/`protocol`,
/// or has a field of the wrong semantic type (spec.md §4.1).
pub fn parse(bytes: &[u8]) -> Result<EnvelopeIn, ParseError> {
	let value: Value = serde_json::from_slice(bytes)?;
	if !value.is_object() {
		return Err(ParseError::NotAnObject);
	}
	let obj = value.as_object().expect("checked above");
	if !obj.contains_key("protocol") {
		return Err(ParseError::MissingField("protocol"));
	}
	if !obj.contains_key("kind") {
		return Err(ParseError::MissingField("kind"));
	}
	serde_json::from_value(value).map_err(|e| {
		ParseError::WrongType {
			field: "<envelope>",
			detail: e.to_string(),
		}
	})
}

/// Serializes a stamped envelope back to wire bytes.
pub fn serialize(envelope: &Envelope) -> Vec<u8> {
	// Envelope's Serialize impl cannot fail: every field is a plain JSON
	// value already validated on the way in.
	serde_json::to_vec(envelope).expect("Envelope always serializes")
}

/// Generates a new globally-unique envelope/participant id.
pub fn new_id() -> String {
	mew_core::id::new_id()
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
