use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	#[serde(default)]
	pub security: Security,
	pub backends: Backends,
	pub providers: Providers,
	#[serde(default)]
	pub dispatch: Dispatch,
	#[serde(default)]
	pub health: Health,
	#[serde(default)]
	pub validator: Validator,
	#[serde(default)]
	pub ranking: Ranking,
	#[serde(default)]
	pub cache: Cache,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Security {
	pub bind_localhost_only: bool,
	pub api_auth_token: Option<String>,
}
impl Default for Security {
	fn default() -> Self {
		Self { bind_localhost_only: true, api_auth_token: None }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Backends {
	pub vector: VectorBackend,
	pub graph: GraphBackend,
	pub kv: KvBackend,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VectorBackend {
	pub url: String,
	pub collection: String,
	#[serde(default = "default_vector_name")]
	pub vector_name: String,
	pub vector_dim: u32,
	/// One of cosine, euclid, dot, or manhattan.
	pub distance: String,
	pub timeout_ms: Option<u64>,
	#[serde(default)]
	pub index: VectorIndex,
}

/// HNSW build parameters the collection is expected to carry.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VectorIndex {
	pub m: u64,
	pub ef_construct: u64,
}
impl Default for VectorIndex {
	fn default() -> Self {
		Self { m: 16, ef_construct: 100 }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct GraphBackend {
	pub url: String,
	#[serde(default = "default_graph_database")]
	pub database: String,
	pub username: String,
	pub password: String,
	pub timeout_ms: Option<u64>,
	#[serde(default = "default_graph_label")]
	pub label: String,
	#[serde(default = "default_graph_max_hops")]
	pub max_hops: u32,
	/// Score multiplier applied once per hop away from a matching node.
	#[serde(default = "default_graph_hop_decay")]
	pub hop_decay: f32,
	#[serde(default)]
	pub expected_constraints: Vec<String>,
	#[serde(default)]
	pub expected_indexes: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct KvBackend {
	pub dsn: String,
	pub pool_max_conns: u32,
	pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Dispatch {
	pub backend_timeout_ms: u64,
	pub request_deadline_ms: u64,
	pub default_limit: u32,
	pub max_limit: u32,
}
impl Default for Dispatch {
	fn default() -> Self {
		Self { backend_timeout_ms: 200, request_deadline_ms: 500, default_limit: 10, max_limit: 100 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Health {
	pub probe_interval_secs: u64,
	pub failure_threshold: u32,
	pub cooldown_secs: u64,
	pub degraded_latency_ms: u64,
}
impl Default for Health {
	fn default() -> Self {
		Self {
			probe_interval_secs: 30,
			failure_threshold: 3,
			cooldown_secs: 60,
			degraded_latency_ms: 150,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Validator {
	pub max_clauses: u32,
	pub max_traversal_depth: u32,
	pub max_query_chars: u32,
	pub allowed_procedures: Vec<String>,
	pub allow_string_literals: bool,
}
impl Default for Validator {
	fn default() -> Self {
		Self {
			max_clauses: 12,
			max_traversal_depth: 4,
			max_query_chars: 4_096,
			allowed_procedures: vec![
				"db.labels".to_string(),
				"db.relationshipTypes".to_string(),
				"db.propertyKeys".to_string(),
			],
			allow_string_literals: true,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Ranking {
	pub policy: String,
	pub shadow_policy: Option<String>,
	pub policies: Vec<RankingPolicy>,
}
impl Default for Ranking {
	fn default() -> Self {
		Self { policy: "default".to_string(), shadow_policy: None, policies: builtin_policies() }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct RankingPolicy {
	pub name: String,
	pub vector_weight: f32,
	#[serde(default)]
	pub graph_weight: f32,
	#[serde(default)]
	pub kv_weight: f32,
	/// Multiplier applied to the combined score of items whose content type is "code".
	pub code_boost: Option<f32>,
	/// Time constant of the exponential decay applied to the vector score.
	pub recency_tau_days: Option<f32>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub enabled: bool,
	pub ttl_secs: u64,
}
impl Default for Cache {
	fn default() -> Self {
		Self { enabled: false, ttl_secs: 300 }
	}
}

pub fn builtin_policies() -> Vec<RankingPolicy> {
	vec![
		RankingPolicy {
			name: "default".to_string(),
			vector_weight: 1.0,
			graph_weight: 0.0,
			kv_weight: 0.0,
			code_boost: None,
			recency_tau_days: None,
		},
		RankingPolicy {
			name: "lexical_boost".to_string(),
			vector_weight: 0.7,
			graph_weight: 0.3,
			kv_weight: 0.3,
			code_boost: None,
			recency_tau_days: None,
		},
		RankingPolicy {
			name: "code_boost".to_string(),
			vector_weight: 1.0,
			graph_weight: 0.3,
			kv_weight: 0.3,
			code_boost: Some(1.25),
			recency_tau_days: None,
		},
		RankingPolicy {
			name: "recency".to_string(),
			vector_weight: 1.0,
			graph_weight: 0.3,
			kv_weight: 0.3,
			code_boost: None,
			recency_tau_days: Some(30.0),
		},
	]
}

fn default_vector_name() -> String {
	"dense".to_string()
}

fn default_graph_database() -> String {
	"neo4j".to_string()
}

fn default_graph_label() -> String {
	"Context".to_string()
}

fn default_graph_max_hops() -> u32 {
	2
}

fn default_graph_hop_decay() -> f32 {
	0.5
}
