pub mod graph;
pub mod kv;
pub mod vector;

pub use graph::GraphAdapter;
pub use kv::KvAdapter;
pub use vector::VectorAdapter;

use std::{future::Future, time::Duration};

use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::time::{self as tokio_time, Instant};

use mnemo_domain::{
	cypher_gate::ValidatedQuery,
	health::HealthStatus,
	item::{ItemContent, STATUS_RETIRED},
	query::BackendKind,
	time_serde,
};

use crate::BoxFuture;

/// Backend-neutral form of one search request.
#[derive(Clone, Debug, Default)]
pub struct AdapterQuery {
	pub text: String,
	pub filters: Map<String, Value>,
	pub limit: u32,
	pub embedding: Option<Vec<f32>>,
	pub graph_query: Option<ValidatedQuery>,
	pub kv_prefix: Option<String>,
}

/// One hit with its score already normalized to `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct BackendHit {
	pub id: String,
	pub score: f32,
	pub content: ItemContent,
	pub updated_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
	#[error("{0}")]
	Unavailable(String),
	#[error("Timed out after {0} ms.")]
	Timeout(u64),
	#[error("{0}")]
	MalformedQuery(String),
}

#[derive(Clone, Debug)]
pub struct HealthProbe {
	pub status: HealthStatus,
	pub latency: Duration,
	pub detail: Option<String>,
}

/// Uniform surface over one remote store. Adapters never retry.
pub trait BackendAdapter
where
	Self: Send + Sync,
{
	fn kind(&self) -> BackendKind;

	fn query<'a>(
		&'a self,
		query: &'a AdapterQuery,
		timeout: Duration,
	) -> BoxFuture<'a, Result<Vec<BackendHit>, AdapterError>>;

	fn health_check(&self) -> BoxFuture<'_, HealthProbe>;
}

pub(crate) async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, AdapterError>
where
	F: Future<Output = Result<T, AdapterError>>,
{
	match tokio_time::timeout(timeout, fut).await {
		Ok(result) => result,
		Err(_) => Err(AdapterError::Timeout(timeout.as_millis() as u64)),
	}
}

pub(crate) async fn probe<F>(timeout: Duration, fut: F) -> HealthProbe
where
	F: Future<Output = mnemo_storage::Result<()>>,
{
	let started = Instant::now();
	let (status, detail) = match tokio_time::timeout(timeout, fut).await {
		Ok(Ok(())) => (HealthStatus::Healthy, None),
		Ok(Err(err)) => (HealthStatus::Unavailable, Some(err.to_string())),
		Err(_) => (
			HealthStatus::Unavailable,
			Some(format!("Health check timed out after {} ms.", timeout.as_millis())),
		),
	};

	HealthProbe { status, latency: started.elapsed(), detail }
}

/// Maps storage failures to adapter errors. Bad arguments are the caller's fault, not the
/// backend's.
pub(crate) fn storage_error(err: mnemo_storage::Error) -> AdapterError {
	match err {
		mnemo_storage::Error::InvalidArgument(message) => AdapterError::MalformedQuery(message),
		mnemo_storage::Error::Graph { code, message } if code.starts_with("Neo.ClientError.Statement") =>
			AdapterError::MalformedQuery(format!("{code}: {message}")),
		other => AdapterError::Unavailable(other.to_string()),
	}
}

/// Reads item content from a JSON object, accepting both flat payloads and serialized
/// context items.
pub(crate) fn content_from_json(object: &Map<String, Value>) -> ItemContent {
	if let Some(Value::Object(nested)) = object.get("content") {
		return content_from_json(nested);
	}

	let text = string_field(object, "text").or_else(|| string_field(object, "content"));

	ItemContent {
		text: text.unwrap_or_default(),
		content_type: string_field(object, "type").unwrap_or_default(),
		title: string_field(object, "title"),
		fact_type: string_field(object, "fact_type"),
	}
}

pub(crate) fn updated_at_from_json(object: &Map<String, Value>) -> Option<OffsetDateTime> {
	string_field(object, "updated_at")
		.or_else(|| {
			object
				.get("metadata")
				.and_then(Value::as_object)
				.and_then(|metadata| string_field(metadata, "updated_at"))
		})
		.and_then(|raw| time_serde::parse_lenient(&raw))
}

pub(crate) fn is_retired(object: &Map<String, Value>) -> bool {
	string_field(object, "status").is_some_and(|status| status == STATUS_RETIRED)
}

pub(crate) fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
	match object.get(key)? {
		Value::String(text) => Some(text.clone()),
		Value::Number(number) => Some(number.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn reads_flat_and_nested_content() {
		let flat = json!({ "text": "login flow", "type": "code", "title": "Auth" });
		let nested = json!({
			"id": "a",
			"content": { "text": "login flow", "type": "code", "title": "Auth" },
			"metadata": { "updated_at": "2026-01-02T03:04:05Z" }
		});
		let flat = flat.as_object().cloned().unwrap_or_default();
		let nested = nested.as_object().cloned().unwrap_or_default();

		assert_eq!(content_from_json(&flat), content_from_json(&nested));
		assert!(updated_at_from_json(&nested).is_some());
		assert!(updated_at_from_json(&flat).is_none());
	}

	#[test]
	fn client_statement_errors_are_malformed_queries() {
		let err = storage_error(mnemo_storage::Error::Graph {
			code: "Neo.ClientError.Statement.SyntaxError".to_string(),
			message: "bad".to_string(),
		});

		assert!(matches!(err, AdapterError::MalformedQuery(_)));
		assert!(matches!(
			storage_error(mnemo_storage::Error::Decode("x".to_string())),
			AdapterError::Unavailable(_)
		));
	}
}
