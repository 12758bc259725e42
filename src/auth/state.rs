//! OAuth `state` generation for the authorization redirect.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use rand::RngCore;

/// Number of random bytes encoded into each state string.
pub const STATE_BYTES: usize = 64;

/// Generates a URL-safe base64 state string from [`STATE_BYTES`] random bytes.
pub fn new_state() -> String {
	let mut bytes = [0_u8; STATE_BYTES];

	rand::rng().fill_bytes(&mut bytes);

	URL_SAFE.encode(bytes)
}

/// Compares an issued state with the one returned by the provider, ignoring ASCII case.
pub fn state_matches(issued: &str, returned: &str) -> bool {
	!issued.is_empty() && issued.eq_ignore_ascii_case(returned)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn states_are_unique_and_url_safe() {
		let first = new_state();
		let second = new_state();

		assert_ne!(first, second);
		assert_eq!(first.len(), 88);
		assert!(first.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '=')));
	}

	#[test]
	fn state_comparison_ignores_case_but_not_content() {
		assert!(state_matches("AbC-_", "abc-_"));
		assert!(!state_matches("abc", "abd"));
		assert!(!state_matches("", ""));
	}
}
