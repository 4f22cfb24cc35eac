//! The per-topic history ring — spec.md §4.5.

use chrono::{DateTime, Utc};
use mew_core::ring::BoundedRing;

use crate::envelope::Envelope;

#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
	pub limit: usize,
	pub before_id: Option<String>,
	pub before_ts: Option<DateTime<Utc>>,
	/// Not part of spec.md's core query shape, but needed to satisfy §8
	/// scenario S6 ("observers following context `R1` can reconstruct the
	/// thought chain by filtering") without making callers paginate the
	/// whole ring client-side.
	pub context: Option<String>,
}

/// A bounded, insertion-ordered ring of accepted envelopes for one topic.
/// Never persisted (spec.md §1 Non-goals).
#[derive(Debug)]
pub struct HistoryStore {
	ring: BoundedRing<Envelope>,
}

impl HistoryStore {
	pub fn new(max_count: usize, max_bytes: Option<usize>) -> Self {
		Self {
			ring: BoundedRing::new(max_count, max_bytes, Envelope::approx_size),
		}
	}

	/// Appends `envelope`, evicting the oldest entries needed to stay
	/// within budget. Returns the number evicted.
	pub fn append(&mut self, envelope: Envelope) -> usize {
		self.ring.push(envelope)
	}

	pub fn len(&self) -> usize {
		self.ring.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ring.is_empty()
	}

	/// Full insertion-ordered snapshot, used to assemble `system/welcome`
	/// (spec.md §4.4, default last 100).
	pub fn snapshot(&self) -> Vec<Envelope> {
		self.ring.iter().cloned().collect()
	}

	pub fn query(&self, q: &HistoryQuery) -> Vec<Envelope> {
		let mut items: Vec<&Envelope> = self.ring.iter().collect();
		if let Some(ctx) = &q.context {
			items.retain(|e| e.context.as_deref() == Some(ctx.as_str()));
		}
		let end = if let Some(before_id) = &q.before_id {
			// before_id wins over before_ts when both are given (spec.md §4.5).
			items
				.iter()
				.position(|e| &e.id == before_id)
				.unwrap_or(items.len())
		} else if let Some(before_ts) = q.before_ts {
			items
				.iter()
				.position(|e| e.ts >= before_ts)
				.unwrap_or(items.len())
		} else {
			items.len()
		};
		let start = end.saturating_sub(q.limit);
		items[start..end].iter().map(|e| (*e).clone()).collect()
	}
}
