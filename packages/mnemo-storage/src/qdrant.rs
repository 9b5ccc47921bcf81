use std::collections::{BTreeMap, HashMap};

use qdrant_client::qdrant::{
	CollectionConfig, Condition, Distance, Filter, HnswConfigDiff, Query, QueryPointsBuilder,
	ScoredPoint, Value as QdrantValue, VectorParams, point_id::PointIdOptions, value::Kind,
	vectors_config::Config as VectorsConfigKind,
};
use serde_json::{Map, Number, Value};

use crate::{Error, Result};

pub const STATUS_FIELD: &str = "status";
pub const RETIRED_STATUS: &str = "retired";

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_name: String,
	pub vector_dim: u32,
}

#[derive(Clone, Debug)]
pub struct VectorHit {
	pub id: String,
	pub raw_score: f32,
	pub payload: Map<String, Value>,
}

/// Schema parameters read back from the live collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VectorSchemaInfo {
	pub dim: u64,
	pub distance: String,
	pub index_params: BTreeMap<String, u64>,
}

impl QdrantStore {
	pub fn new(cfg: &mnemo_config::VectorBackend) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self {
			client,
			collection: cfg.collection.clone(),
			vector_name: cfg.vector_name.clone(),
			vector_dim: cfg.vector_dim,
		})
	}

	pub async fn search(
		&self,
		vector: Vec<f32>,
		filters: &Map<String, Value>,
		limit: u64,
	) -> Result<Vec<VectorHit>> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Query vector has {} dimensions, expected {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		let filter = build_filter(filters)?;
		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.using(self.vector_name.clone())
			.filter(filter)
			.limit(limit)
			.with_payload(true);
		let response = self.client.query(search).await?;

		Ok(response.result.into_iter().filter_map(scored_point_to_hit).collect())
	}

	pub async fn health(&self) -> Result<()> {
		self.client.health_check().await?;

		Ok(())
	}

	pub async fn schema(&self) -> Result<VectorSchemaInfo> {
		let response = self.client.collection_info(self.collection.clone()).await?;
		let config = response
			.result
			.and_then(|info| info.config)
			.ok_or_else(|| Error::NotFound(format!("Collection {} has no config.", self.collection)))?;

		schema_from_config(&config, &self.vector_name)
	}
}

fn build_filter(filters: &Map<String, Value>) -> Result<Filter> {
	let mut must = Vec::with_capacity(filters.len());

	for (key, value) in filters {
		let condition = match value {
			Value::String(text) => Condition::matches(key.clone(), text.clone()),
			Value::Bool(flag) => Condition::matches(key.clone(), *flag),
			Value::Number(number) => match number.as_i64() {
				Some(int) => Condition::matches(key.clone(), int),
				None =>
					return Err(Error::InvalidArgument(format!(
						"Filter {key:?} must be an integer, string, or boolean."
					))),
			},
			Value::Array(items) => {
				let texts = items
					.iter()
					.map(|item| item.as_str().map(str::to_string))
					.collect::<Option<Vec<_>>>()
					.ok_or_else(|| {
						Error::InvalidArgument(format!("Filter {key:?} list must contain strings."))
					})?;

				Condition::matches(key.clone(), texts)
			},
			_ =>
				return Err(Error::InvalidArgument(format!(
					"Filter {key:?} must be an integer, string, boolean, or string list."
				))),
		};

		must.push(condition);
	}

	Ok(Filter {
		must,
		should: Vec::new(),
		must_not: vec![Condition::matches(STATUS_FIELD, RETIRED_STATUS.to_string())],
		min_should: None,
	})
}

fn scored_point_to_hit(point: ScoredPoint) -> Option<VectorHit> {
	let id = match point.id.and_then(|id| id.point_id_options)? {
		PointIdOptions::Uuid(id) => id,
		PointIdOptions::Num(num) => num.to_string(),
	};

	Some(VectorHit { id, raw_score: point.score, payload: payload_to_json(point.payload) })
}

pub fn payload_to_json(payload: HashMap<String, QdrantValue>) -> Map<String, Value> {
	payload.into_iter().map(|(key, value)| (key, qdrant_value_to_json(value))).collect()
}

fn qdrant_value_to_json(value: QdrantValue) -> Value {
	match value.kind {
		Some(Kind::StringValue(text)) => Value::String(text),
		Some(Kind::BoolValue(flag)) => Value::Bool(flag),
		Some(Kind::IntegerValue(int)) => Value::from(int),
		Some(Kind::DoubleValue(double)) =>
			Number::from_f64(double).map(Value::Number).unwrap_or(Value::Null),
		Some(Kind::ListValue(list)) =>
			Value::Array(list.values.into_iter().map(qdrant_value_to_json).collect()),
		Some(Kind::StructValue(object)) => Value::Object(payload_to_json(object.fields)),
		Some(Kind::NullValue(_)) | None => Value::Null,
	}
}

fn schema_from_config(config: &CollectionConfig, vector_name: &str) -> Result<VectorSchemaInfo> {
	let params = config
		.params
		.as_ref()
		.and_then(|params| params.vectors_config.as_ref())
		.and_then(|vectors| vectors.config.as_ref())
		.ok_or_else(|| Error::Decode("Collection has no vectors config.".to_string()))?;
	let vector: &VectorParams = match params {
		VectorsConfigKind::Params(params) => params,
		VectorsConfigKind::ParamsMap(map) => map.map.get(vector_name).ok_or_else(|| {
			Error::NotFound(format!("Named vector {vector_name:?} is not configured."))
		})?,
	};
	let distance = Distance::try_from(vector.distance)
		.map(|distance| distance.as_str_name().to_ascii_lowercase())
		.map_err(|_| Error::Decode(format!("Unknown distance value {}.", vector.distance)))?;
	let mut index_params = BTreeMap::new();

	merge_hnsw(&mut index_params, config.hnsw_config.as_ref());
	merge_hnsw(&mut index_params, vector.hnsw_config.as_ref());

	Ok(VectorSchemaInfo { dim: vector.size, distance, index_params })
}

/// Later calls override earlier ones, so per-vector settings win over collection defaults.
fn merge_hnsw(out: &mut BTreeMap<String, u64>, hnsw: Option<&HnswConfigDiff>) {
	let Some(hnsw) = hnsw else { return };

	if let Some(m) = hnsw.m {
		out.insert("m".to_string(), m);
	}
	if let Some(ef_construct) = hnsw.ef_construct {
		out.insert("ef_construct".to_string(), ef_construct);
	}
}

#[cfg(test)]
mod tests {
	use qdrant_client::qdrant::{ListValue, Struct, value::Kind};
	use serde_json::json;

	use super::*;

	fn qv(kind: Kind) -> QdrantValue {
		QdrantValue { kind: Some(kind) }
	}

	#[test]
	fn converts_nested_payload() {
		let mut inner = HashMap::new();

		inner.insert("n".to_string(), qv(Kind::IntegerValue(3)));

		let mut payload = HashMap::new();

		payload.insert("title".to_string(), qv(Kind::StringValue("Auth".to_string())));
		payload.insert(
			"tags".to_string(),
			qv(Kind::ListValue(ListValue { values: vec![qv(Kind::BoolValue(true))] })),
		);
		payload.insert("meta".to_string(), qv(Kind::StructValue(Struct { fields: inner })));

		let json = Value::Object(payload_to_json(payload));

		assert_eq!(json, json!({ "title": "Auth", "tags": [true], "meta": { "n": 3 } }));
	}

	#[test]
	fn filter_always_excludes_retired_items() {
		let mut filters = Map::new();

		filters.insert("type".to_string(), json!("code"));

		let filter = build_filter(&filters).expect("Filter must build.");

		assert_eq!(filter.must.len(), 1);
		assert_eq!(filter.must_not.len(), 1);
	}

	#[test]
	fn filter_rejects_objects() {
		let mut filters = Map::new();

		filters.insert("meta".to_string(), json!({ "a": 1 }));

		assert!(matches!(build_filter(&filters), Err(Error::InvalidArgument(_))));
	}
}
