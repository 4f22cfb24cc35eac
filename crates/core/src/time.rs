use chrono::{DateTime, Utc};

/// Wall-clock "now", isolated behind one function so admission-pipeline
/// clock-skew normalization (spec.md §4.4 step 1) has a single seam to
/// mock in tests.
pub fn now() -> DateTime<Utc> {
	Utc::now()
}

/// How far `ts` may drift from server clock before the gateway normalizes
/// it (spec.md §3: "normalize e.ts to server clock if absent or skewed by
/// more than a bounded tolerance (e.g. 60s)").
pub const CLOCK_SKEW_TOLERANCE: chrono::Duration = chrono::Duration::seconds(60);

/// Returns `true` when `ts` is within [`CLOCK_SKEW_TOLERANCE`] of `now`.
pub fn within_tolerance(ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
	(ts - now).abs() <= CLOCK_SKEW_TOLERANCE
}
