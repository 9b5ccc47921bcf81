use serde_json::Value;

use mnemo_config::Ranking;
use mnemo_domain::query::BackendKind;

use crate::{Error, Result};

/// A ranking policy with its optional knobs filled in.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPolicy {
	pub name: String,
	pub vector_weight: f32,
	pub graph_weight: f32,
	pub kv_weight: f32,
	/// `1.0` when the policy does not boost code.
	pub code_boost: f32,
	pub recency_tau_days: Option<f32>,
}
impl ResolvedPolicy {
	pub fn weight(&self, kind: BackendKind) -> f32 {
		match kind {
			BackendKind::Vector => self.vector_weight,
			BackendKind::Graph => self.graph_weight,
			BackendKind::Kv => self.kv_weight,
		}
	}
}

/// Looks up the requested policy, falling back to the configured active one.
pub fn resolve_policy(cfg: &Ranking, requested: Option<&str>) -> Result<ResolvedPolicy> {
	let name = requested.map(str::trim).filter(|name| !name.is_empty()).unwrap_or(&cfg.policy);
	let policy = cfg.policies.iter().find(|policy| policy.name == name).ok_or_else(|| {
		Error::InvalidRequest { message: format!("Unknown ranking policy {name:?}.") }
	})?;

	Ok(ResolvedPolicy {
		name: policy.name.clone(),
		vector_weight: policy.vector_weight,
		graph_weight: policy.graph_weight,
		kv_weight: policy.kv_weight,
		code_boost: policy.code_boost.unwrap_or(1.0),
		recency_tau_days: policy.recency_tau_days,
	})
}

pub fn resolve_shadow_policy(cfg: &Ranking) -> Result<Option<ResolvedPolicy>> {
	cfg.shadow_policy.as_deref().map(|name| resolve_policy(cfg, Some(name))).transpose()
}

pub fn build_policy_snapshot(policy: &ResolvedPolicy) -> Value {
	serde_json::json!({
		"name": policy.name,
		"weights": {
			"vector": policy.vector_weight,
			"graph": policy.graph_weight,
			"kv": policy.kv_weight,
		},
		"code_boost": policy.code_boost,
		"recency_tau_days": policy.recency_tau_days,
		"tie_break": ["updated_at_desc", "id_asc"],
	})
}

pub fn hash_policy_snapshot(payload: &Value) -> Result<String> {
	let raw = serde_json::to_vec(payload).map_err(|err| Error::Storage {
		message: format!("Failed to encode policy snapshot: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}
