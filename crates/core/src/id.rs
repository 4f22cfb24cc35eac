use rand::RngCore;

/// Generates an opaque, URL-safe identifier with enough entropy that
/// collisions within any realistic history retention window are negligible.
///
/// Format is intentionally undocumented to callers beyond "unique string" —
/// spec.md's codec contract (`newId() -> string`) only requires uniqueness,
/// not a particular shape.
pub fn new_id() -> String {
	let mut bytes = [0u8; 16];
	rand::thread_rng().fill_bytes(&mut bytes);
	uuid::Uuid::from_bytes(bytes)
		.hyphenated()
		.to_string()
}

/// Generates an opaque bearer token. Distinct from [`new_id`] only in name —
/// callers should not assume tokens and envelope/participant ids share a
/// format, even though today they do.
pub fn new_token() -> String {
	let mut bytes = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut bytes);
	base64_url(&bytes)
}

fn base64_url(bytes: &[u8]) -> String {
	use std::fmt::Write;
	const ALPHABET: &[u8] =
		b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
	let mut out = String::with_capacity((bytes.len() * 8).div_ceil(6));
	let mut bits = 0u32;
	let mut nbits = 0u32;
	for &b in bytes {
		bits = (bits << 8) | b as u32;
		nbits += 8;
		while nbits >= 6 {
			nbits -= 6;
			let idx = (bits >> nbits) & 0x3f;
			let _ = write!(out, "{}", ALPHABET[idx as usize] as char);
		}
	}
	if nbits > 0 {
		let idx = (bits << (6 - nbits)) & 0x3f;
		let _ = write!(out, "{}", ALPHABET[idx as usize] as char);
	}
	out
}
