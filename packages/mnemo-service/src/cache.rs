use serde_json::{Map, Value};

use crate::{Error, Result};

const CACHE_SCHEMA_VERSION: i32 = 1;
pub const CACHE_KEY_PREFIX: &str = "cache:search:";

/// Inputs that determine a search response.
pub struct FingerprintInput<'a> {
	pub query: &'a str,
	pub mode: &'a str,
	pub limit: u32,
	pub policy_hash: &'a str,
	pub filters: &'a Map<String, Value>,
	pub embedding: Option<&'a [f32]>,
	pub cypher: Option<&'a str>,
	pub params: &'a Map<String, Value>,
	pub kv_prefix: Option<&'a str>,
}

pub fn fingerprint(input: &FingerprintInput<'_>) -> Result<String> {
	let payload = serde_json::json!({
		"schema_version": CACHE_SCHEMA_VERSION,
		"query": input.query.trim(),
		"mode": input.mode,
		"limit": input.limit,
		"policy": input.policy_hash,
		"filters": input.filters,
		"embedding": input.embedding.map(embedding_digest),
		"cypher": input.cypher.map(str::trim),
		"params": input.params,
		"kv_prefix": input.kv_prefix,
	});
	let raw = serde_json::to_vec(&payload).map_err(|err| Error::Storage {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

pub fn cache_key(fingerprint: &str) -> String {
	format!("{CACHE_KEY_PREFIX}{fingerprint}")
}

pub fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(CACHE_KEY_PREFIX.len() + 12);

	&key[..len]
}

fn embedding_digest(vector: &[f32]) -> String {
	let mut hasher = blake3::Hasher::new();

	for value in vector {
		hasher.update(&value.to_le_bytes());
	}

	hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn input<'a>(query: &'a str, filters: &'a Map<String, Value>) -> FingerprintInput<'a> {
		FingerprintInput {
			query,
			mode: "hybrid",
			limit: 10,
			policy_hash: "p",
			filters,
			embedding: None,
			cypher: None,
			params: filters,
			kv_prefix: None,
		}
	}

	#[test]
	fn fingerprint_ignores_surrounding_whitespace() {
		let empty = Map::new();
		let a = fingerprint(&input("auth flow", &empty)).expect("Fingerprint failed.");
		let b = fingerprint(&input("  auth flow ", &empty)).expect("Fingerprint failed.");

		assert_eq!(a, b);
		assert!(cache_key(&a).starts_with(CACHE_KEY_PREFIX));
	}

	#[test]
	fn fingerprint_tracks_embedding_values() {
		let empty = Map::new();
		let mut a = input("q", &empty);
		let mut b = input("q", &empty);
		let first = [0.1, 0.2];
		let second = [0.1, 0.3];

		a.embedding = Some(&first);
		b.embedding = Some(&second);

		assert_ne!(
			fingerprint(&a).expect("Fingerprint failed."),
			fingerprint(&b).expect("Fingerprint failed.")
		);
	}
}
