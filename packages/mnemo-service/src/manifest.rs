//! Deploy-time schema snapshot and parity check. Nothing here runs while serving requests.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use mnemo_config::Config;

use crate::{
	Clients, Error, GraphClient, Result, VectorClient,
	ranking::{self, build_policy_snapshot, hash_policy_snapshot},
};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Manifest {
	pub commit: String,
	pub config_hashes: BTreeMap<String, String>,
	pub vector_schema: VectorSchema,
	pub graph_schema: GraphSchema,
	#[serde(with = "mnemo_domain::time_serde")]
	pub timestamp: OffsetDateTime,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VectorSchema {
	pub dim: u64,
	pub distance: String,
	pub index_params: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GraphSchema {
	pub constraints: Vec<String>,
	pub indexes: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Mismatch {
	pub field: String,
	pub expected: Value,
	pub actual: Value,
}
impl Mismatch {
	fn describe(&self) -> String {
		format!("{}: expected {}, got {}", self.field, self.expected, self.actual)
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ParityReport {
	pub passed: bool,
	pub mismatches: Vec<Mismatch>,
}
impl ParityReport {
	/// Fails with [`Error::ConfigMismatch`] unless every compared field matched.
	pub fn into_result(self) -> Result<Self> {
		if self.passed {
			return Ok(self);
		}

		Err(Error::ConfigMismatch { mismatches: self.mismatches.iter().map(Mismatch::describe).collect() })
	}
}

/// Hashes of the configuration sections whose drift would change retrieval behaviour.
pub fn config_hashes(cfg: &Config) -> Result<BTreeMap<String, String>> {
	let vector = &cfg.backends.vector;
	let graph = &cfg.backends.graph;
	let active = ranking::resolve_policy(&cfg.ranking, None)?;
	let shadow = ranking::resolve_shadow_policy(&cfg.ranking)?;
	let sections = [
		(
			"vector",
			serde_json::json!({
				"collection": vector.collection,
				"vector_name": vector.vector_name,
				"vector_dim": vector.vector_dim,
				"distance": vector.distance,
				"index": { "m": vector.index.m, "ef_construct": vector.index.ef_construct },
				"embedding_model": cfg.providers.embedding.model,
			}),
		),
		(
			"graph",
			serde_json::json!({
				"database": graph.database,
				"label": graph.label,
				"max_hops": graph.max_hops,
				"hop_decay": graph.hop_decay,
				"expected_constraints": sorted_names(&graph.expected_constraints),
				"expected_indexes": sorted_names(&graph.expected_indexes),
			}),
		),
		(
			"ranking",
			serde_json::json!({
				"active": build_policy_snapshot(&active),
				"shadow": shadow.as_ref().map(build_policy_snapshot),
			}),
		),
		(
			"validator",
			serde_json::json!({
				"max_clauses": cfg.validator.max_clauses,
				"max_traversal_depth": cfg.validator.max_traversal_depth,
				"max_query_chars": cfg.validator.max_query_chars,
				"allowed_procedures": sorted_names(&cfg.validator.allowed_procedures),
				"allow_string_literals": cfg.validator.allow_string_literals,
			}),
		),
	];
	let mut hashes = BTreeMap::new();

	for (name, payload) in sections {
		hashes.insert(name.to_string(), hash_policy_snapshot(&payload)?);
	}

	Ok(hashes)
}

/// The reference manifest the configuration declares, used as the lock file.
pub fn build_reference(cfg: &Config, commit: &str, now: OffsetDateTime) -> Result<Manifest> {
	let vector = &cfg.backends.vector;

	Ok(Manifest {
		commit: commit.to_string(),
		config_hashes: config_hashes(cfg)?,
		vector_schema: VectorSchema {
			dim: u64::from(vector.vector_dim),
			distance: vector.distance.to_ascii_lowercase(),
			index_params: BTreeMap::from([
				("ef_construct".to_string(), vector.index.ef_construct),
				("m".to_string(), vector.index.m),
			]),
		},
		graph_schema: GraphSchema {
			constraints: sorted_names(&cfg.backends.graph.expected_constraints),
			indexes: sorted_names(&cfg.backends.graph.expected_indexes),
		},
		timestamp: now,
	})
}

/// Reads the live schema parameters from the vector and graph backends.
pub async fn generate(
	cfg: &Config,
	clients: &Clients,
	commit: &str,
	now: OffsetDateTime,
) -> Result<Manifest> {
	generate_from(cfg, clients.vector.as_ref(), clients.graph.as_ref(), commit, now).await
}

/// Same as [`generate`] for callers that only hold the two schema-bearing clients.
pub async fn generate_from(
	cfg: &Config,
	vector: &dyn VectorClient,
	graph: &dyn GraphClient,
	commit: &str,
	now: OffsetDateTime,
) -> Result<Manifest> {
	let vector = vector.schema().await?;
	let graph = graph.schema().await?;

	tracing::info!(
		dim = vector.dim,
		distance = %vector.distance,
		constraint_count = graph.constraints.len(),
		index_count = graph.indexes.len(),
		"Generated backend manifest."
	);

	Ok(Manifest {
		commit: commit.to_string(),
		config_hashes: config_hashes(cfg)?,
		vector_schema: VectorSchema {
			dim: vector.dim,
			distance: vector.distance.to_ascii_lowercase(),
			index_params: vector.index_params,
		},
		graph_schema: GraphSchema {
			constraints: sorted_names(&graph.constraints),
			indexes: sorted_names(&graph.indexes),
		},
		timestamp: now,
	})
}

/// Compares a manifest with the lock. `commit` and `timestamp` are informational only.
/// Graph constraints and indexes named by the lock must be present; extra ones are allowed.
pub fn check_parity(manifest: &Manifest, lock: &Manifest) -> ParityReport {
	let mut mismatches = Vec::new();
	let expected = &lock.vector_schema;
	let actual = &manifest.vector_schema;

	if expected.dim != actual.dim {
		mismatches.push(Mismatch {
			field: "vector_schema.dim".to_string(),
			expected: Value::from(expected.dim),
			actual: Value::from(actual.dim),
		});
	}
	if !expected.distance.eq_ignore_ascii_case(&actual.distance) {
		mismatches.push(Mismatch {
			field: "vector_schema.distance".to_string(),
			expected: Value::from(expected.distance.clone()),
			actual: Value::from(actual.distance.clone()),
		});
	}

	for (key, value) in &expected.index_params {
		let found = actual.index_params.get(key);

		if found != Some(value) {
			mismatches.push(Mismatch {
				field: format!("vector_schema.index_params.{key}"),
				expected: Value::from(*value),
				actual: found.map(|found| Value::from(*found)).unwrap_or(Value::Null),
			});
		}
	}

	check_names(
		"graph_schema.constraints",
		&lock.graph_schema.constraints,
		&manifest.graph_schema.constraints,
		&mut mismatches,
	);
	check_names(
		"graph_schema.indexes",
		&lock.graph_schema.indexes,
		&manifest.graph_schema.indexes,
		&mut mismatches,
	);

	for (key, value) in &lock.config_hashes {
		let found = manifest.config_hashes.get(key);

		if found != Some(value) {
			mismatches.push(Mismatch {
				field: format!("config_hashes.{key}"),
				expected: Value::from(value.clone()),
				actual: found.cloned().map(Value::from).unwrap_or(Value::Null),
			});
		}
	}

	ParityReport { passed: mismatches.is_empty(), mismatches }
}

fn check_names(field: &str, expected: &[String], actual: &[String], mismatches: &mut Vec<Mismatch>) {
	let present = actual.iter().collect::<BTreeSet<_>>();
	let missing = expected.iter().filter(|name| !present.contains(name)).cloned().collect::<Vec<_>>();

	if missing.is_empty() {
		return;
	}

	mismatches.push(Mismatch {
		field: field.to_string(),
		expected: Value::from(missing),
		actual: Value::from(sorted_names(actual)),
	});
}

fn sorted_names(names: &[String]) -> Vec<String> {
	names.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect()
}
