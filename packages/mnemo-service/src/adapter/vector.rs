use std::{sync::Arc, time::Duration};

use mnemo_domain::query::BackendKind;

use crate::{
	BoxFuture,
	adapter::{
		AdapterError, AdapterQuery, BackendAdapter, BackendHit, HealthProbe, content_from_json,
		is_retired, probe, storage_error, updated_at_from_json, with_timeout,
	},
	clients::{EmbeddingProvider, VectorClient},
};

pub struct VectorAdapter {
	client: Arc<dyn VectorClient>,
	embedding: Arc<dyn EmbeddingProvider>,
	distance: String,
	vector_dim: u32,
	probe_timeout: Duration,
}
impl VectorAdapter {
	pub fn new(
		cfg: &mnemo_config::VectorBackend,
		client: Arc<dyn VectorClient>,
		embedding: Arc<dyn EmbeddingProvider>,
		probe_timeout: Duration,
	) -> Self {
		Self {
			client,
			embedding,
			distance: cfg.distance.clone(),
			vector_dim: cfg.vector_dim,
			probe_timeout,
		}
	}

	async fn run(&self, query: &AdapterQuery) -> Result<Vec<BackendHit>, AdapterError> {
		let vector = match &query.embedding {
			Some(vector) => {
				if vector.len() != self.vector_dim as usize {
					return Err(AdapterError::MalformedQuery(format!(
						"Embedding has {} dimensions, expected {}.",
						vector.len(),
						self.vector_dim
					)));
				}

				vector.clone()
			},
			None => self.embed(&query.text).await?,
		};
		let hits = self
			.client
			.search(vector, &query.filters, u64::from(query.limit))
			.await
			.map_err(storage_error)?;

		Ok(hits
			.into_iter()
			.filter(|hit| !is_retired(&hit.payload))
			.map(|hit| BackendHit {
				score: normalize_vector_score(&self.distance, hit.raw_score),
				content: content_from_json(&hit.payload),
				updated_at: updated_at_from_json(&hit.payload),
				id: hit.id,
			})
			.collect())
	}

	async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError> {
		let text = text.trim();

		if text.is_empty() {
			return Err(AdapterError::MalformedQuery(
				"Vector search needs query text or an embedding.".to_string(),
			));
		}

		let texts = vec![text.to_string()];
		let mut vectors = self
			.embedding
			.embed(&texts)
			.await
			.map_err(|err| AdapterError::Unavailable(format!("Embedding failed: {err}")))?;

		match vectors.pop() {
			Some(vector) if vector.len() == self.vector_dim as usize => Ok(vector),
			Some(vector) => Err(AdapterError::Unavailable(format!(
				"Embedding provider returned {} dimensions, expected {}.",
				vector.len(),
				self.vector_dim
			))),
			None => Err(AdapterError::Unavailable("Embedding provider returned no vector.".to_string())),
		}
	}
}

impl BackendAdapter for VectorAdapter {
	fn kind(&self) -> BackendKind {
		BackendKind::Vector
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

/// Similarity metrics are clamped; distance metrics map through `1 / (1 + d)`.
pub fn normalize_vector_score(distance: &str, raw: f32) -> f32 {
	if !raw.is_finite() {
		return 0.0;
	}

	match distance {
		"euclid" | "manhattan" => 1.0 / (1.0 + raw.max(0.0)),
		_ => raw.clamp(0.0, 1.0),
	}
}
