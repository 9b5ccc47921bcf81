use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use mnemo_config::{Config, Error};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_value() -> Value {
	toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.")
}

fn set_path(value: &mut Value, path: &[&str], new_value: Value) {
	let (last, parents) = path.split_last().expect("Path must be non-empty.");
	let mut table = value.as_table_mut().expect("Config must be a table.");

	for key in parents {
		table = table
			.get_mut(*key)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Sample config must include [{key}]."));
	}

	table.insert((*last).to_string(), new_value);
}

fn remove_path(value: &mut Value, path: &[&str]) {
	let (last, parents) = path.split_last().expect("Path must be non-empty.");
	let mut table = value.as_table_mut().expect("Config must be a table.");

	for key in parents {
		table = table
			.get_mut(*key)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Sample config must include [{key}]."));
	}

	table.remove(*last);
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("mnemo_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_value(value: &Value) -> mnemo_config::Result<Config> {
	let payload = toml::to_string(value).expect("Failed to render config.");
	let path = write_temp_config(payload);
	let result = mnemo_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation_error(value: &Value, needle: &str) {
	let err = load_value(value).expect_err("Expected validation error.");

	assert!(matches!(err, Error::Validation { .. }), "Unexpected error kind: {err:?}");

	let message = err.to_string();

	assert!(message.contains(needle), "Unexpected error message: {message}");
}

#[test]
fn sample_config_loads_and_normalizes() {
	let cfg = load_value(&sample_value()).expect("Sample config must load.");

	assert_eq!(cfg.backends.vector.distance, "cosine");
	assert_eq!(cfg.backends.vector.vector_name, "dense");
	assert!(cfg.security.api_auth_token.is_none(), "Blank token must normalize to None.");
	assert_eq!(cfg.ranking.shadow_policy.as_deref(), Some("lexical_boost"));
	assert_eq!(cfg.validator.allowed_procedures.len(), 3);
	assert_eq!(cfg.backends.graph.label, "Context");
}

#[test]
fn builtin_policies_apply_when_none_are_configured() {
	let cfg = load_value(&sample_value()).expect("Sample config must load.");
	let names: Vec<&str> = cfg.ranking.policies.iter().map(|policy| policy.name.as_str()).collect();

	assert_eq!(names, vec!["default", "lexical_boost", "code_boost", "recency"]);

	let lexical = &cfg.ranking.policies[1];

	assert_eq!(lexical.vector_weight, 0.7);
	assert_eq!(lexical.graph_weight, 0.3);
}

#[test]
fn missing_optional_sections_use_defaults() {
	let mut value = sample_value();

	for section in ["dispatch", "health", "validator", "ranking", "cache", "security"] {
		remove_path(&mut value, &[section]);
	}

	let cfg = load_value(&value).expect("Config without optional sections must load.");

	assert_eq!(cfg.dispatch.backend_timeout_ms, 200);
	assert_eq!(cfg.health.probe_interval_secs, 30);
	assert_eq!(cfg.health.failure_threshold, 3);
	assert_eq!(cfg.ranking.policy, "default");
	assert!(!cfg.cache.enabled);
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let mut value = sample_value();

	set_path(&mut value, &["providers", "embedding", "dimensions"], Value::Integer(768));

	expect_validation_error(
		&value,
		"providers.embedding.dimensions must match backends.vector.vector_dim.",
	);
}

#[test]
fn unknown_distance_metric_is_rejected() {
	let mut value = sample_value();

	set_path(&mut value, &["backends", "vector", "distance"], Value::String("hamming".into()));

	expect_validation_error(&value, "backends.vector.distance must be one of");
}

#[test]
fn request_deadline_must_cover_backend_timeout() {
	let mut value = sample_value();

	set_path(&mut value, &["dispatch", "request_deadline_ms"], Value::Integer(100));

	expect_validation_error(&value, "dispatch.request_deadline_ms must be at least");
}

#[test]
fn default_limit_must_not_exceed_max_limit() {
	let mut value = sample_value();

	set_path(&mut value, &["dispatch", "default_limit"], Value::Integer(500));

	expect_validation_error(&value, "dispatch.default_limit must not exceed dispatch.max_limit.");
}

#[test]
fn graph_hops_must_fit_validator_depth() {
	let mut value = sample_value();

	set_path(&mut value, &["backends", "graph", "max_hops"], Value::Integer(9));

	expect_validation_error(&value, "backends.graph.max_hops must not exceed");
}

#[test]
fn hop_decay_must_be_a_fraction() {
	let mut value = sample_value();

	set_path(&mut value, &["backends", "graph", "hop_decay"], Value::Float(1.5));

	expect_validation_error(&value, "backends.graph.hop_decay must be in the range");
}

#[test]
fn active_policy_must_exist() {
	let mut value = sample_value();

	set_path(&mut value, &["ranking", "policy"], Value::String("missing".into()));

	expect_validation_error(&value, "ranking.policy \"missing\" is not defined");
}

#[test]
fn shadow_policy_must_exist() {
	let mut value = sample_value();

	set_path(&mut value, &["ranking", "shadow_policy"], Value::String("ghost".into()));

	expect_validation_error(&value, "ranking.shadow_policy \"ghost\" is not defined");
}

#[test]
fn custom_policies_replace_builtins_and_are_checked() {
	let mut value = sample_value();
	let policy: Value = toml::from_str(
		r#"
name = "default"
vector_weight = 0.5
graph_weight = -0.1
"#,
	)
	.expect("Failed to parse policy.");

	set_path(&mut value, &["ranking", "shadow_policy"], Value::String(String::new()));
	set_path(&mut value, &["ranking", "policies"], Value::Array(vec![policy]));

	expect_validation_error(&value, "ranking.policies.graph_weight must be zero or greater.");
}

#[test]
fn code_boost_must_not_shrink_scores() {
	let mut value = sample_value();
	let policy: Value = toml::from_str(
		r#"
name = "default"
vector_weight = 1.0
code_boost = 0.5
"#,
	)
	.expect("Failed to parse policy.");

	set_path(&mut value, &["ranking", "shadow_policy"], Value::String(String::new()));
	set_path(&mut value, &["ranking", "policies"], Value::Array(vec![policy]));

	expect_validation_error(&value, "ranking.policies.code_boost must be");
}

#[test]
fn validator_bounds_must_be_positive() {
	let mut value = sample_value();

	set_path(&mut value, &["validator", "max_clauses"], Value::Integer(0));

	expect_validation_error(&value, "validator.max_clauses must be greater than zero.");
}

#[test]
fn failure_threshold_must_be_positive() {
	let mut value = sample_value();

	set_path(&mut value, &["health", "failure_threshold"], Value::Integer(0));

	expect_validation_error(&value, "health.failure_threshold must be greater than zero.");
}

#[test]
fn unreadable_config_reports_path() {
	let path = env::temp_dir().join("mnemo_config_missing_file.toml");
	let err = mnemo_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }), "Unexpected error kind: {err:?}");
}
