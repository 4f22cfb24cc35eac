//! Per-session token bucket — SPEC_FULL.md §B "Rate limiting": the
//! `rate_limited` error code appears in spec.md §6/§7's taxonomy with no
//! accompanying module, so a minimal, disabled-by-default limiter lives
//! here to make the code reachable. Scaled-down cousin of the teacher's
//! `remoteratelimit` module: no distributed state, just a local bucket
//! per participant inside the topic actor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `rate`/`burst` in envelopes-per-second terms. Disabled when absent
/// from config (the default).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
	pub envelopes_per_sec: f64,
	pub burst: f64,
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			envelopes_per_sec: 50.0,
			burst: 100.0,
		}
	}
}

/// A single participant's bucket. Refills continuously based on wall
/// clock elapsed since the last check, rather than on a ticking timer —
/// cheap to keep one per participant with no background task.
#[derive(Debug, Clone)]
pub struct TokenBucket {
	tokens: f64,
	capacity: f64,
	refill_per_sec: f64,
	last_refill: DateTime<Utc>,
}

impl TokenBucket {
	pub fn new(config: RateLimitConfig) -> Self {
		Self {
			tokens: config.burst,
			capacity: config.burst,
			refill_per_sec: config.envelopes_per_sec,
			last_refill: Utc::now(),
		}
	}

	/// Attempts to take one token at `now`. `false` means the caller
	/// should be rejected with `rate_limited` (spec.md §6).
	pub fn try_take(&mut self, now: DateTime<Utc>) -> bool {
		let elapsed = (now - self.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
		self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
		self.last_refill = now;
		if self.tokens >= 1.0 {
			self.tokens -= 1.0;
			true
		} else {
			false
		}
	}
}
