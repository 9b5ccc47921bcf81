use std::{sync::Arc, time::Duration};

use serde_json::{Map, Value};

use mnemo_domain::{
	cypher_gate::{self, ValidatedQuery},
	item::STATUS_RETIRED,
	query::BackendKind,
};
use mnemo_storage::graph::Row;

use crate::{
	BoxFuture, Result,
	adapter::{
		AdapterError, AdapterQuery, BackendAdapter, BackendHit, HealthProbe, content_from_json,
		is_retired, probe, storage_error, string_field, updated_at_from_json, with_timeout,
	},
	clients::GraphClient,
};

/// Base score of a node whose title contains the query text without equalling it.
pub const PARTIAL_MATCH_SCORE: f32 = 0.8;

pub struct GraphAdapter {
	client: Arc<dyn GraphClient>,
	template: ValidatedQuery,
	hop_decay: f32,
	probe_timeout: Duration,
}
impl GraphAdapter {
	/// Builds the adapter and passes its text-match template through the query gate once.
	pub fn new(
		cfg: &mnemo_config::Config,
		client: Arc<dyn GraphClient>,
		probe_timeout: Duration,
	) -> Result<Self> {
		let graph = &cfg.backends.graph;
		let statement = text_match_template(&graph.label, graph.max_hops);
		let template =
			cypher_gate::cypher_gate(&statement, &template_params("", 1), &cfg.validator)?;

		Ok(Self { client, template, hop_decay: graph.hop_decay, probe_timeout })
	}

	async fn run(&self, query: &AdapterQuery) -> Result<Vec<BackendHit>, AdapterError> {
		let rows = match &query.graph_query {
			Some(validated) => self
				.client
				.run_read_only(&validated.text, &validated.params)
				.await
				.map_err(storage_error)?,
			None => {
				let text = query.text.trim().to_lowercase();

				if text.is_empty() {
					return Err(AdapterError::MalformedQuery(
						"Graph search needs query text or a structured query.".to_string(),
					));
				}

				let params = template_params(&text, query.limit);

				self.client
					.run_read_only(&self.template.text, &params)
					.await
					.map_err(storage_error)?
			},
		};

		rows_to_hits(&rows, self.hop_decay, query.limit as usize)
	}
}

impl BackendAdapter for GraphAdapter {
	fn kind(&self) -> BackendKind {
		BackendKind::Graph
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

pub fn text_match_template(label: &str, max_hops: u32) -> String {
	format!(
		"\
MATCH (seed:{label})
WHERE toLower(coalesce(seed.title, $empty)) CONTAINS $text
	OR toLower(coalesce(seed.content, $empty)) CONTAINS $text
MATCH p = (seed)-[*0..{max_hops}]-(n:{label})
WHERE coalesce(n.status, $empty) <> $retired
WITH n, min(length(p)) AS hops,
	max(CASE WHEN toLower(coalesce(n.title, $empty)) = $text THEN 1 ELSE 0 END) AS exact
RETURN n.id AS id, n.title AS title, n.content AS content, n.type AS type,
	n.fact_type AS fact_type, n.updated_at AS updated_at, n.status AS status, hops, exact
ORDER BY hops ASC, exact DESC, id ASC
LIMIT $limit"
	)
}

fn template_params(text: &str, limit: u32) -> Map<String, Value> {
	let mut params = Map::new();

	params.insert("text".to_string(), Value::from(text));
	params.insert("limit".to_string(), Value::from(limit));
	params.insert("empty".to_string(), Value::from(""));
	params.insert("retired".to_string(), Value::from(STATUS_RETIRED));

	params
}

/// Rows must carry an `id` column. `score`, `exact`, and `hops` shape the normalized score
/// when present.
fn rows_to_hits(rows: &[Row], hop_decay: f32, limit: usize) -> Result<Vec<BackendHit>, AdapterError> {
	let mut hits = Vec::with_capacity(rows.len().min(limit));
	let mut missing_ids = 0;

	for row in rows {
		let Some(id) = string_field(row, "id") else {
			missing_ids += 1;

			continue;
		};

		if is_retired(row) {
			continue;
		}

		hits.push(BackendHit {
			id,
			score: graph_score(row, hop_decay),
			content: content_from_json(row),
			updated_at: updated_at_from_json(row),
		});

		if hits.len() == limit {
			break;
		}
	}

	if hits.is_empty() && missing_ids > 0 {
		return Err(AdapterError::MalformedQuery(
			"Graph query rows must include an id column.".to_string(),
		));
	}

	Ok(hits)
}

pub fn graph_score(row: &Row, hop_decay: f32) -> f32 {
	let base = match (row.get("score").and_then(Value::as_f64), row.get("exact")) {
		(Some(score), _) => score as f32,
		(None, Some(exact)) =>
			if is_truthy(exact) {
				1.0
			} else {
				PARTIAL_MATCH_SCORE
			},
		(None, None) => 1.0,
	};
	let hops = row.get("hops").and_then(Value::as_u64).unwrap_or(0).min(i32::MAX as u64) as i32;
	let score = base * hop_decay.powi(hops);

	if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 }
}

fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Bool(flag) => *flag,
		Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
		_ => false,
	}
}
