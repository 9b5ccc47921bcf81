mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Backends, Cache, Config, Dispatch, EmbeddingProviderConfig, GraphBackend, Health, KvBackend,
	Providers, Ranking, RankingPolicy, Security, Service, Validator, VectorBackend, VectorIndex,
	builtin_policies,
};

use std::{collections::HashSet, fs, path::Path};

pub const DISTANCE_METRICS: [&str; 4] = ["cosine", "euclid", "dot", "manhattan"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("backends.vector.url", &cfg.backends.vector.url),
		("backends.vector.collection", &cfg.backends.vector.collection),
		("backends.graph.url", &cfg.backends.graph.url),
		("backends.graph.database", &cfg.backends.graph.database),
		("backends.graph.label", &cfg.backends.graph.label),
		("backends.kv.dsn", &cfg.backends.kv.dsn),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	validate_backends(cfg)?;
	validate_dispatch(cfg)?;
	validate_health(cfg)?;
	validate_validator(cfg)?;
	validate_ranking(cfg)?;

	if cfg.cache.enabled && cfg.cache.ttl_secs == 0 {
		return Err(Error::Validation {
			message: "cache.ttl_secs must be greater than zero when enabled.".to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider embedding api_key must be non-empty.".to_string(),
		});
	}

	Ok(())
}

fn validate_backends(cfg: &Config) -> Result<()> {
	let vector = &cfg.backends.vector;

	if vector.vector_dim == 0 {
		return Err(Error::Validation {
			message: "backends.vector.vector_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != vector.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match backends.vector.vector_dim."
				.to_string(),
		});
	}
	if !DISTANCE_METRICS.contains(&vector.distance.as_str()) {
		return Err(Error::Validation {
			message: "backends.vector.distance must be one of cosine, euclid, dot, or manhattan."
				.to_string(),
		});
	}
	if vector.index.m == 0 || vector.index.ef_construct == 0 {
		return Err(Error::Validation {
			message: "backends.vector.index.m and ef_construct must be greater than zero."
				.to_string(),
		});
	}

	for (label, timeout) in [
		("backends.vector.timeout_ms", vector.timeout_ms),
		("backends.graph.timeout_ms", cfg.backends.graph.timeout_ms),
		("backends.kv.timeout_ms", cfg.backends.kv.timeout_ms),
	] {
		if timeout == Some(0) {
			return Err(Error::Validation { message: format!("{label} must be greater than zero.") });
		}
		if let Some(timeout) = timeout
			&& timeout > cfg.dispatch.request_deadline_ms
		{
			return Err(Error::Validation {
				message: format!("{label} must not exceed dispatch.request_deadline_ms."),
			});
		}
	}

	let graph = &cfg.backends.graph;

	if graph.max_hops == 0 {
		return Err(Error::Validation {
			message: "backends.graph.max_hops must be greater than zero.".to_string(),
		});
	}
	if graph.max_hops > cfg.validator.max_traversal_depth {
		return Err(Error::Validation {
			message: "backends.graph.max_hops must not exceed validator.max_traversal_depth."
				.to_string(),
		});
	}
	if !graph.hop_decay.is_finite() || graph.hop_decay <= 0.0 || graph.hop_decay > 1.0 {
		return Err(Error::Validation {
			message: "backends.graph.hop_decay must be in the range (0.0, 1.0].".to_string(),
		});
	}
	if !graph.label.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
		return Err(Error::Validation {
			message: "backends.graph.label must be an ASCII identifier.".to_string(),
		});
	}
	if cfg.backends.kv.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "backends.kv.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_dispatch(cfg: &Config) -> Result<()> {
	let dispatch = &cfg.dispatch;

	if dispatch.backend_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "dispatch.backend_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if dispatch.request_deadline_ms < dispatch.backend_timeout_ms {
		return Err(Error::Validation {
			message: "dispatch.request_deadline_ms must be at least dispatch.backend_timeout_ms."
				.to_string(),
		});
	}
	if dispatch.default_limit == 0 || dispatch.max_limit == 0 {
		return Err(Error::Validation {
			message: "dispatch.default_limit and dispatch.max_limit must be greater than zero."
				.to_string(),
		});
	}
	if dispatch.default_limit > dispatch.max_limit {
		return Err(Error::Validation {
			message: "dispatch.default_limit must not exceed dispatch.max_limit.".to_string(),
		});
	}

	Ok(())
}

fn validate_health(cfg: &Config) -> Result<()> {
	if cfg.health.probe_interval_secs == 0 {
		return Err(Error::Validation {
			message: "health.probe_interval_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.health.failure_threshold == 0 {
		return Err(Error::Validation {
			message: "health.failure_threshold must be greater than zero.".to_string(),
		});
	}
	if cfg.health.degraded_latency_ms == 0 {
		return Err(Error::Validation {
			message: "health.degraded_latency_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_validator(cfg: &Config) -> Result<()> {
	let validator = &cfg.validator;

	if validator.max_clauses == 0 {
		return Err(Error::Validation {
			message: "validator.max_clauses must be greater than zero.".to_string(),
		});
	}
	if validator.max_traversal_depth == 0 {
		return Err(Error::Validation {
			message: "validator.max_traversal_depth must be greater than zero.".to_string(),
		});
	}
	if validator.max_query_chars == 0 {
		return Err(Error::Validation {
			message: "validator.max_query_chars must be greater than zero.".to_string(),
		});
	}

	for procedure in &validator.allowed_procedures {
		if procedure.trim().is_empty()
			|| !procedure.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '.' || ch == '_')
		{
			return Err(Error::Validation {
				message: format!(
					"validator.allowed_procedures entry {procedure:?} must be a dotted identifier."
				),
			});
		}
	}

	Ok(())
}

fn validate_ranking(cfg: &Config) -> Result<()> {
	let ranking = &cfg.ranking;

	if ranking.policies.is_empty() {
		return Err(Error::Validation {
			message: "ranking.policies must be non-empty.".to_string(),
		});
	}

	let mut names = HashSet::new();

	for policy in &ranking.policies {
		if policy.name.trim().is_empty() {
			return Err(Error::Validation {
				message: "ranking.policies.name must be non-empty.".to_string(),
			});
		}
		if !names.insert(policy.name.as_str()) {
			return Err(Error::Validation {
				message: format!("ranking.policies contains duplicate name {:?}.", policy.name),
			});
		}

		for (label, weight) in [
			("vector_weight", policy.vector_weight),
			("graph_weight", policy.graph_weight),
			("kv_weight", policy.kv_weight),
		] {
			if !weight.is_finite() {
				return Err(Error::Validation {
					message: format!("ranking.policies.{label} must be a finite number."),
				});
			}
			if weight < 0.0 {
				return Err(Error::Validation {
					message: format!("ranking.policies.{label} must be zero or greater."),
				});
			}
		}

		if let Some(boost) = policy.code_boost
			&& (!boost.is_finite() || boost < 1.0)
		{
			return Err(Error::Validation {
				message: "ranking.policies.code_boost must be a finite number of at least 1.0."
					.to_string(),
			});
		}
		if let Some(tau) = policy.recency_tau_days
			&& (!tau.is_finite() || tau <= 0.0)
		{
			return Err(Error::Validation {
				message: "ranking.policies.recency_tau_days must be greater than zero.".to_string(),
			});
		}
	}

	if !names.contains(ranking.policy.as_str()) {
		return Err(Error::Validation {
			message: format!("ranking.policy {:?} is not defined in ranking.policies.", ranking.policy),
		});
	}
	if let Some(shadow) = ranking.shadow_policy.as_deref()
		&& !names.contains(shadow)
	{
		return Err(Error::Validation {
			message: format!("ranking.shadow_policy {shadow:?} is not defined in ranking.policies."),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.security.api_auth_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.security.api_auth_token = None;
	}
	if cfg.ranking.shadow_policy.as_deref().map(|name| name.trim().is_empty()).unwrap_or(false) {
		cfg.ranking.shadow_policy = None;
	}

	cfg.backends.vector.distance = cfg.backends.vector.distance.trim().to_ascii_lowercase();
	cfg.ranking.policy = cfg.ranking.policy.trim().to_string();

	for policy in &mut cfg.ranking.policies {
		policy.name = policy.name.trim().to_string();
	}
}
