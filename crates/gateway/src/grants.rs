//! The capability engine runtime: grant/ack/revoke and invite issuance —
//! spec.md §4.6.
//!
//! This module holds the data types and the pure decision logic. The
//! stateful orchestration (who has a pending grant, timing out an
//! unacked grant) lives in [`crate::topic::actor`], which is the sole
//! writer of topic state (spec.md §5: "the topic lock").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::RuleSet;
use crate::error::GrantError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
	PendingAck,
	Active,
	Revoked,
	Expired,
}

/// A capability added to a participant at runtime (spec.md §3 "Grant").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Grant {
	pub id: String,
	pub recipient: String,
	pub capabilities: RuleSet,
	pub granted_by: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<DateTime<Utc>>,
	pub status: GrantStatus,
	/// The envelope id of the originating `capability/grant`, so an
	/// incoming `capability/grant-ack`'s `correlation_id` can be checked
	/// against it (spec.md §4.6 step 3).
	pub envelope_id: String,
}

impl Grant {
	pub fn new(envelope_id: impl Into<String>, recipient: impl Into<String>, granted_by: impl Into<String>, capabilities: RuleSet, reason: Option<String>) -> Self {
		let envelope_id = envelope_id.into();
		Self {
			id: mew_core::id::new_id(),
			recipient: recipient.into(),
			capabilities,
			granted_by: granted_by.into(),
			reason,
			created_at: Utc::now(),
			expires_at: None,
			status: GrantStatus::PendingAck,
			envelope_id,
		}
	}

	pub fn is_active(&self) -> bool {
		match self.status {
			GrantStatus::Active => !self.is_expired(Utc::now()),
			_ => false,
		}
	}

	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		self.expires_at.is_some_and(|exp| now >= exp)
	}

	/// Validates an incoming `capability/grant-ack` against this pending
	/// grant: only the recipient may ack their own grant, and the ack
	/// must correlate to this grant's originating envelope (spec.md §4.6
	/// "Critical integrity rule").
	pub fn validate_ack(&self, ack_from: &str, ack_correlation: &[String]) -> Result<(), GrantError> {
		if self.status != GrantStatus::PendingAck {
			// Double-acking is a no-op, not an error (spec.md §8).
			return Err(GrantError::UnknownGrant(self.id.clone()));
		}
		if ack_from != self.recipient || !ack_correlation.iter().any(|c| c == &self.envelope_id) {
			return Err(GrantError::AckFromMismatch);
		}
		Ok(())
	}
}

/// A brand-new participant row created by `space/invite` (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct Invite {
	pub participant_id: String,
	pub token: String,
	pub initial_capabilities: RuleSet,
	pub invited_by: String,
	pub created_at: DateTime<Utc>,
}

impl Invite {
	pub fn new(participant_id: impl Into<String>, initial_capabilities: RuleSet, invited_by: impl Into<String>) -> Self {
		Self {
			participant_id: participant_id.into(),
			token: mew_core::id::new_token(),
			initial_capabilities,
			invited_by: invited_by.into(),
			created_at: Utc::now(),
		}
	}
}
