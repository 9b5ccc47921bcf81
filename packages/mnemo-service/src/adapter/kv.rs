use std::{collections::HashSet, sync::Arc, time::Duration};

use serde_json::{Map, Value};
use time::OffsetDateTime;

use mnemo_domain::query::BackendKind;

use crate::{
	BoxFuture,
	adapter::{
		AdapterError, AdapterQuery, BackendAdapter, BackendHit, HealthProbe, content_from_json,
		is_retired, probe, storage_error, string_field, updated_at_from_json, with_timeout,
	},
	cache::CACHE_KEY_PREFIX,
	clients::KvClient,
};

/// Key namespace for normalized lookup phrases.
pub const LOOKUP_KEY_PREFIX: &str = "key:";
/// Key namespace for items addressed by id.
pub const ITEM_KEY_PREFIX: &str = "item:";

const HIT_SCORE: f32 = 1.0;

pub struct KvAdapter {
	client: Arc<dyn KvClient>,
	probe_timeout: Duration,
}
impl KvAdapter {
	pub fn new(client: Arc<dyn KvClient>, probe_timeout: Duration) -> Self {
		Self { client, probe_timeout }
	}

	async fn run(&self, query: &AdapterQuery) -> Result<Vec<BackendHit>, AdapterError> {
		let prefix = query.kv_prefix.as_deref().map(str::trim).filter(|prefix| !prefix.is_empty());
		let keys = lookup_keys(&query.text);

		if keys.is_empty() && prefix.is_none() {
			return Err(AdapterError::MalformedQuery(
				"Key-value lookup needs query text or a key prefix.".to_string(),
			));
		}

		let limit = query.limit as usize;
		let mut seen = HashSet::new();
		let mut hits = Vec::new();

		for key in &keys {
			if let Some(value) = self.client.get(key).await.map_err(storage_error)? {
				push_hit(&mut hits, &mut seen, key, &value, None);
			}
		}

		if let Some(prefix) = prefix {
			let entries = self.client.scan(prefix, query.limit).await.map_err(storage_error)?;

			// Cached search responses share the store but are not items.
			for entry in entries.into_iter().filter(|entry| !entry.key.starts_with(CACHE_KEY_PREFIX)) {
				push_hit(&mut hits, &mut seen, &entry.key, &entry.value, Some(entry.updated_at));
			}
		}

		hits.truncate(limit);

		Ok(hits)
	}
}

impl BackendAdapter for KvAdapter {
	fn kind(&self) -> BackendKind {
		BackendKind::Kv
	}

	fn query<'a>(
		&'a self,
		query: &'a AdapterQuery,
		timeout: Duration,
	) -> BoxFuture<'a, Result<Vec<BackendHit>, AdapterError>> {
		Box::pin(with_timeout(timeout, self.run(query)))
	}

	fn health_check(&self) -> BoxFuture<'_, HealthProbe> {
		Box::pin(probe(self.probe_timeout, self.client.health()))
	}
}

/// Exact-match keys for free text: the normalized phrase and the raw text as an item id.
pub fn lookup_keys(text: &str) -> Vec<String> {
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return Vec::new();
	}

	let phrase = trimmed.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();

	vec![format!("{LOOKUP_KEY_PREFIX}{phrase}"), format!("{ITEM_KEY_PREFIX}{trimmed}")]
}

fn push_hit(
	hits: &mut Vec<BackendHit>,
	seen: &mut HashSet<String>,
	key: &str,
	value: &Value,
	stored_at: Option<OffsetDateTime>,
) {
	let empty = Map::new();
	let object = value.as_object().unwrap_or(&empty);

	if is_retired(object) {
		return;
	}

	let id = string_field(object, "id").unwrap_or_else(|| key_suffix(key).to_string());

	if !seen.insert(id.clone()) {
		return;
	}

	let mut content = content_from_json(object);

	if content.text.is_empty()
		&& let Value::String(text) = value
	{
		content.text = text.clone();
	}

	hits.push(BackendHit {
		id,
		score: HIT_SCORE,
		content,
		updated_at: updated_at_from_json(object).or(stored_at),
	});
}

fn key_suffix(key: &str) -> &str {
	key.split_once(':').map(|(_, suffix)| suffix).unwrap_or(key)
}
