//! Pattern primitives behind the capability matcher (spec.md §4.2):
//! segment-aware `kind` globbing, generic string globbing for payload
//! leaves, and the deep-subset object/array matcher.

use serde_json::Value;

/// `kind` pattern matching. `*` matches exactly one `/`-delimited
/// segment; `**` matches any suffix (zero or more segments); anything
/// else must match the segment literally.
///
/// `mcp/*` matches `mcp/request` but not `mcp/request/inner`.
/// `mcp/**` matches both.
pub fn kind_matches(pattern: &str, kind: &str) -> bool {
	let pat: Vec<&str> = pattern.split('/').collect();
	let val: Vec<&str> = kind.split('/').collect();
	segments_match(&pat, &val)
}

fn segments_match(pat: &[&str], val: &[&str]) -> bool {
	match pat.first() {
		None => val.is_empty(),
		Some(&"**") => (0..=val.len()).any(|i| segments_match(&pat[1..], &val[i..])),
		Some(&"*") => !val.is_empty() && segments_match(&pat[1..], &val[1..]),
		Some(seg) => !val.is_empty() && val[0] == *seg && segments_match(&pat[1..], &val[1..]),
	}
}

/// `true` if every `kind` matched by `narrower` is also matched by
/// `wider` — a coarse but sound check used only to pick revoke targets
/// (spec.md §4.6, `conflicts()`), never to grant access.
pub fn pattern_subsumes(wider: &str, narrower: &str) -> bool {
	if wider == "**" {
		return true;
	}
	if wider == narrower {
		return true;
	}
	let wider_segs: Vec<&str> = wider.split('/').collect();
	let narrower_segs: Vec<&str> = narrower.split('/').collect();
	if wider_segs.last() == Some(&"**") {
		let prefix = &wider_segs[..wider_segs.len() - 1];
		return narrower_segs.len() >= prefix.len()
			&& prefix
				.iter()
				.zip(narrower_segs.iter())
				.all(|(w, n)| *w == "*" || w == n);
	}
	wider_segs.len() == narrower_segs.len()
		&& wider_segs
			.iter()
			.zip(narrower_segs.iter())
			.all(|(w, n)| *w == "*" || w == n)
}

/// Generic string glob for payload leaves: `*`/`**` both mean "any run of
/// characters" here — payload strings aren't `/`-segmented paths, so
/// there is no segment distinction to make (unlike `kind_matches`).
pub fn string_glob_matches(pattern: &str, value: &str) -> bool {
	if !pattern.contains('*') {
		return pattern == value;
	}
	let parts: Vec<&str> = pattern.split('*').collect();
	let mut rest = value;
	for (i, part) in parts.iter().enumerate() {
		if part.is_empty() {
			continue;
		}
		if i == 0 {
			if !rest.starts_with(part) {
				return false;
			}
			rest = &rest[part.len()..];
		} else if i == parts.len() - 1 {
			if !rest.ends_with(part) {
				return false;
			}
			return true;
		} else {
			match rest.find(part) {
				Some(idx) => rest = &rest[idx + part.len()..],
				None => return false,
			}
		}
	}
	true
}

/// Is `envelope_value` a deep superset of `rule_value`, per spec.md §4.2
/// (c)?
///
/// - Primitives compare by equality, except glob strings on the rule
///   side, which match via [`string_glob_matches`].
/// - Rule objects require every listed key to appear with a recursively
///   matching value.
/// - Rule arrays match element-wise by position, unless the rule array is
///   a single `**`-suffixed element, which must match at least one entry.
pub fn deep_subset(rule_value: &Value, envelope_value: &Value) -> bool {
	match (rule_value, envelope_value) {
		(Value::String(pat), Value::String(val)) if pat.contains('*') => {
			string_glob_matches(pat, val)
		},
		(Value::Object(rule_obj), Value::Object(env_obj)) => rule_obj.iter().all(|(k, v)| {
			env_obj
				.get(k)
				.is_some_and(|env_v| deep_subset(v, env_v))
		}),
		(Value::Array(rule_arr), Value::Array(env_arr)) => match rule_arr.as_slice() {
			[single] if matches!(single, Value::String(s) if s.ends_with("**")) => {
				env_arr.iter().any(|e| deep_subset(single, e))
			},
			_ => {
				rule_arr.len() <= env_arr.len()
					&& rule_arr
						.iter()
						.zip(env_arr.iter())
						.all(|(r, e)| deep_subset(r, e))
			},
		},
		(rule, env) => rule == env,
	}
}
