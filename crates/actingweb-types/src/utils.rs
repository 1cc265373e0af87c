//! Small shared helpers: id and secret generation, passphrase hashing, and
//! credential masking for logs.

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Derive a new actor id: 32 lowercase hex chars from a UUIDv5 over the
/// actor's prospective URL salted with a random UUIDv4.
pub fn new_actor_id(base_uri: &str) -> Box<str> {
	let seed = Uuid::new_v4();
	let name = format!("{}/{}", base_uri.trim_end_matches('/'), seed.simple());
	Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).simple().to_string().into()
}

/// Random 256-bit secret as lowercase hex.
pub fn random_hex() -> Box<str> {
	let mut bytes = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut bytes);
	let mut out = String::with_capacity(64);
	for b in bytes {
		out.push_str(&format!("{:02x}", b));
	}
	out.into()
}

/// Random URL-safe token with a type prefix, e.g. `aw_at_…`.
pub fn random_token(prefix: &str) -> Box<str> {
	let mut bytes = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut bytes);
	format!("{}{}", prefix, base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)).into()
}

/// Mask a credential for logging: first 8 characters, then an ellipsis.
pub fn mask_token(token: &str) -> String {
	if token.len() <= 8 {
		"********".to_string()
	} else {
		format!("{}…", &token[..8])
	}
}

/// Hash a passphrase with a random salt. Stored as `salt$hash` hex.
pub fn hash_passphrase(passphrase: &str) -> Box<str> {
	let mut salt = [0u8; 16];
	rand::thread_rng().fill_bytes(&mut salt);
	let salt_hex: String = salt.iter().map(|b| format!("{:02x}", b)).collect();
	let digest = Sha256::new_with_prefix(&salt).chain_update(passphrase.as_bytes()).finalize();
	let hash_hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
	format!("{}${}", salt_hex, hash_hex).into()
}

/// Constant-shape verification against a stored `salt$hash` value.
pub fn verify_passphrase(passphrase: &str, stored: &str) -> bool {
	let Some((salt_hex, hash_hex)) = stored.split_once('$') else {
		return false;
	};
	let Some(salt) = hex_decode(salt_hex) else {
		return false;
	};
	let digest = Sha256::new_with_prefix(&salt).chain_update(passphrase.as_bytes()).finalize();
	let computed: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
	// Compare without early exit on first mismatching byte.
	computed.len() == hash_hex.len()
		&& computed
			.bytes()
			.zip(hash_hex.bytes())
			.fold(0u8, |acc, (a, b)| acc | (a ^ b))
			== 0
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
	if s.len() % 2 != 0 {
		return None;
	}
	(0..s.len())
		.step_by(2)
		.map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
		.collect()
}

/// SHA-256 of the input as base64url without padding (PKCE S256).
pub fn s256_challenge(verifier: &str) -> String {
	let digest = Sha256::digest(verifier.as_bytes());
	base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_actor_id_shape() {
		let id = new_actor_id("https://aw.example.com");
		assert_eq!(id.len(), 32);
		assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
		// Two derivations never collide
		assert_ne!(id, new_actor_id("https://aw.example.com"));
	}

	#[test]
	fn test_passphrase_roundtrip() {
		let hash = hash_passphrase("hunter2");
		assert!(verify_passphrase("hunter2", &hash));
		assert!(!verify_passphrase("hunter3", &hash));
		assert!(!verify_passphrase("hunter2", "garbage"));
	}

	#[test]
	fn test_mask_token() {
		assert_eq!(mask_token("aw_at_0123456789"), "aw_at_01…");
		assert_eq!(mask_token("short"), "********");
	}

	#[test]
	fn test_s256() {
		// RFC 7636 appendix B vector
		assert_eq!(
			s256_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
			"E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
		);
	}
}

// vim: ts=4
