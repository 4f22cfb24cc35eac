//! The capability matcher — spec.md §4.2.
//!
//! A [`Rule`] is a structural pattern over an envelope's `kind`/`to`/
//! `payload`. A [`RuleSet`] is an OR over rules: [`RuleSet::allows`] is
//! the single predicate every admission decision in the gateway routes
//! through (spec.md: "capability is the repo's hardest invariant").
//!
//! Matching is pure and side-effect-free by construction — no field here
//! reaches into session or topic state, so callers are free to memoize on
//! `(participant_id, envelope_hash)` as spec.md suggests, without this
//! module knowing or caring.

mod glob;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Envelope;

pub use glob::kind_matches;

/// A structural pattern authorizing production of matching envelopes
/// (spec.md §3 "Capability Rule").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
	pub kind: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub to: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payload: Option<Value>,
}

impl Rule {
	pub fn new(kind: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			to: None,
			payload: None,
		}
	}

	pub fn with_to(mut self, to: Vec<String>) -> Self {
		self.to = Some(to);
		self
	}

	pub fn with_payload(mut self, payload: Value) -> Self {
		self.payload = Some(payload);
		self
	}

	/// Does this single rule permit `envelope`? spec.md §4.2 (a)-(c).
	pub fn matches(&self, envelope: &Envelope) -> bool {
		if !kind_matches(&self.kind, &envelope.kind) {
			return false;
		}
		if let Some(to) = &self.to {
			// "broadcast envelopes do NOT satisfy a to-restricted rule"
			if envelope.to.is_empty() {
				return false;
			}
			if !to.iter().any(|r| envelope.to.contains(r)) {
				return false;
			}
		}
		if let Some(payload) = &self.payload
			&& !glob::deep_subset(payload, &envelope.payload)
		{
			return false;
		}
		true
	}
}

/// An unordered collection of rules granted to one participant.
/// Duplicate rules have no effect; ordering is irrelevant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSet(Vec<Rule>);

impl RuleSet {
	pub fn new(rules: Vec<Rule>) -> Self {
		Self(rules)
	}

	pub fn empty() -> Self {
		Self(Vec::new())
	}

	pub fn rules(&self) -> &[Rule] {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Logical OR over the rule set (spec.md §4.2).
	pub fn allows(&self, envelope: &Envelope) -> bool {
		self.0.iter().any(|r| r.matches(envelope))
	}

	/// Returns the first rule that matches, if any — used by observer
	/// visibility (spec.md §4.4 step 6) to decide a participant should get
	/// a read-only copy of traffic not addressed to them.
	pub fn first_match<'a>(&'a self, envelope: &Envelope) -> Option<&'a Rule> {
		self.0.iter().find(|r| r.matches(envelope))
	}

	/// Unions two rule sets, deduplicating identical rules — used when a
	/// grant's capabilities are merged into a recipient's effective set
	/// (spec.md §4.6).
	pub fn union(&self, other: &RuleSet) -> RuleSet {
		let mut merged = self.0.clone();
		for rule in &other.0 {
			if !merged.contains(rule) {
				merged.push(rule.clone());
			}
		}
		RuleSet(merged)
	}

	/// Removes any rule that [`conflicts`] with one of `patterns` — used
	/// by `capability/revoke` (spec.md §4.6).
	pub fn remove_conflicting(&mut self, patterns: &[Rule]) {
		self.0.retain(|r| !patterns.iter().any(|p| conflicts(r, p)));
	}
}

impl FromIterator<Rule> for RuleSet {
	fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
		RuleSet(iter.into_iter().collect())
	}
}

/// Two rules "conflict" — are candidates for mutual revocation — when one
/// is a structural subset of the other: same kind pattern, and the `to`/
/// `payload` restrictions of one are implied by the other. This is
/// deliberately permissive (used only to select targets for revoke, never
/// to grant), so we treat exact-or-narrower-kind-match as sufficient.
pub fn conflicts(a: &Rule, b: &Rule) -> bool {
	if a.kind == b.kind {
		return true;
	}
	// a's kind pattern is subsumed by b's (or vice versa): if one pattern
	// matches everything the other could ever match, consider them in
	// conflict for revoke-targeting purposes.
	glob::pattern_subsumes(&b.kind, &a.kind) || glob::pattern_subsumes(&a.kind, &b.kind)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
