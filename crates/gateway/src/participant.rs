//! Participant identity — spec.md §3 "Participant".

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::RuleSet;
use crate::grants::Grant;

/// `human` | `agent` | `robot` | any other free-form tag (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantKind {
	Human,
	Agent,
	Robot,
	Other(String),
}

impl Serialize for ParticipantKind {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for ParticipantKind {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Ok(ParticipantKind::from(s.as_str()))
	}
}

impl ParticipantKind {
	pub fn as_str(&self) -> &str {
		match self {
			ParticipantKind::Human => "human",
			ParticipantKind::Agent => "agent",
			ParticipantKind::Robot => "robot",
			ParticipantKind::Other(s) => s,
		}
	}
}

impl From<&str> for ParticipantKind {
	fn from(s: &str) -> Self {
		match s {
			"human" => ParticipantKind::Human,
			"agent" => ParticipantKind::Agent,
			"robot" => ParticipantKind::Robot,
			other => ParticipantKind::Other(other.to_string()),
		}
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
	Online,
	Offline,
}

/// The authenticated identity row a [`crate::topic::Topic`] owns for the
/// lifetime of the topic, independent of any one session being connected
/// (spec.md §3: "A participant may be present or absent; its capability
/// row persists while the topic exists.").
#[derive(Debug, Clone)]
pub struct Participant {
	pub id: String,
	pub name: String,
	pub kind: ParticipantKind,
	/// Capabilities granted at invite/config time — never mutated by
	/// revoke directly (revoke removes from here AND from `grants`, per
	/// spec.md §4.6 "implementations SHOULD do both").
	pub base_capabilities: RuleSet,
	pub grants: Vec<Grant>,
	pub tokens: HashSet<String>,
	pub status: ParticipantStatus,
	pub last_seen: DateTime<Utc>,
	pub metadata: Option<Value>,
}

impl Participant {
	pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ParticipantKind, capabilities: RuleSet) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			kind,
			base_capabilities: capabilities,
			grants: Vec::new(),
			tokens: HashSet::new(),
			status: ParticipantStatus::Offline,
			last_seen: Utc::now(),
			metadata: None,
		}
	}

	/// The effective rule set: base capabilities unioned with every
	/// currently-`Active` grant (spec.md §4.6 step 3: "UNIONs its
	/// capabilities into the recipient's effective rule set").
	pub fn effective_capabilities(&self) -> RuleSet {
		let mut merged = self.base_capabilities.clone();
		for grant in &self.grants {
			if grant.is_active() {
				merged = merged.union(&grant.capabilities);
			}
		}
		merged
	}

	pub fn accepts_token(&self, token: &str) -> bool {
		self.tokens.contains(token)
	}

	/// Roster summary for `system/welcome` (spec.md §4.4): never includes
	/// tokens.
	pub fn summary(&self) -> ParticipantSummary {
		ParticipantSummary {
			id: self.id.clone(),
			name: self.name.clone(),
			kind: self.kind.clone(),
			status: self.status,
			capabilities: self.effective_capabilities(),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantSummary {
	pub id: String,
	pub name: String,
	pub kind: ParticipantKind,
	pub status: ParticipantStatus,
	pub capabilities: RuleSet,
}
