use std::collections::BTreeMap;

use time::macros::datetime;

use mnemo_service::{
	Error, MnemoService,
	manifest::{self, Manifest},
};
use mnemo_storage::{graph::GraphSchemaInfo, qdrant::VectorSchemaInfo};
use mnemo_testkit::FakeBackends;

fn live_backends(dim: u64) -> FakeBackends {
	let fakes = FakeBackends::new(3);

	fakes.vector.set_schema(VectorSchemaInfo {
		dim,
		distance: "Cosine".to_string(),
		index_params: BTreeMap::from([("ef_construct".to_string(), 100), ("m".to_string(), 16)]),
	});
	fakes.graph.set_schema(GraphSchemaInfo {
		constraints: vec!["context_id_unique".to_string(), "legacy_unique".to_string()],
		indexes: vec!["context_title".to_string()],
	});

	fakes
}

async fn live_manifest(fakes: &FakeBackends) -> Manifest {
	manifest::generate(
		&mnemo_testkit::test_config(),
		&fakes.clients(),
		"deadbeef",
		datetime!(2026-03-01 12:00 UTC),
	)
	.await
	.expect("Failed to generate manifest.")
}

fn lock() -> Manifest {
	manifest::build_reference(&mnemo_testkit::test_config(), "cafebabe", datetime!(2026-02-01 0:00 UTC))
		.expect("Failed to build reference manifest.")
}

#[tokio::test]
async fn matching_backends_pass_parity() {
	let fakes = live_backends(3);
	let live = live_manifest(&fakes).await;
	let report = manifest::check_parity(&live, &lock());

	// Commit and timestamp differ, extra graph constraints are tolerated.
	assert!(report.passed, "{:?}", report.mismatches);
	assert!(report.into_result().is_ok());
	assert_eq!(live.vector_schema.distance, "cosine");
}

#[tokio::test]
async fn dimension_drift_is_reported() {
	let fakes = live_backends(768);
	let live = live_manifest(&fakes).await;
	let report = manifest::check_parity(&live, &lock());

	assert!(!report.passed);
	assert_eq!(report.mismatches.len(), 1);
	assert_eq!(report.mismatches[0].field, "vector_schema.dim");
	assert_eq!(report.mismatches[0].expected, 3);
	assert_eq!(report.mismatches[0].actual, 768);

	match report.into_result() {
		Err(Error::ConfigMismatch { mismatches }) => {
			assert_eq!(mismatches.len(), 1);
			assert!(mismatches[0].contains("vector_schema.dim"));
		},
		other => panic!("Unexpected parity result: {other:?}."),
	}
}

#[tokio::test]
async fn missing_graph_index_is_reported() {
	let fakes = live_backends(3);

	fakes.graph.set_schema(GraphSchemaInfo {
		constraints: vec!["context_id_unique".to_string()],
		indexes: Vec::new(),
	});

	let live = live_manifest(&fakes).await;
	let report = manifest::check_parity(&live, &lock());

	assert_eq!(
		report.mismatches.iter().map(|mismatch| mismatch.field.as_str()).collect::<Vec<_>>(),
		vec!["graph_schema.indexes"]
	);
}

#[tokio::test]
async fn index_params_and_config_drift_are_reported() {
	let fakes = live_backends(3);

	fakes.vector.set_schema(VectorSchemaInfo {
		dim: 3,
		distance: "cosine".to_string(),
		index_params: BTreeMap::from([("m".to_string(), 32)]),
	});

	let live = live_manifest(&fakes).await;
	let mut lock = lock();

	lock.config_hashes.insert("ranking".to_string(), "0".repeat(64));

	let report = manifest::check_parity(&live, &lock);
	let fields = report.mismatches.iter().map(|mismatch| mismatch.field.as_str()).collect::<Vec<_>>();

	assert_eq!(
		fields,
		vec![
			"vector_schema.index_params.ef_construct",
			"vector_schema.index_params.m",
			"config_hashes.ranking",
		]
	);
	assert!(report.mismatches[0].actual.is_null());
}

#[test]
fn config_hashes_track_retrieval_settings() {
	let cfg = mnemo_testkit::test_config();
	let base = manifest::config_hashes(&cfg).expect("Failed to hash config.");
	let mut changed = cfg.clone();

	changed.backends.graph.hop_decay = 0.25;

	let drifted = manifest::config_hashes(&changed).expect("Failed to hash config.");

	assert_eq!(base.keys().collect::<Vec<_>>(), vec!["graph", "ranking", "validator", "vector"]);
	assert_ne!(base["graph"], drifted["graph"]);
	assert_eq!(base["vector"], drifted["vector"]);
	assert_eq!(base["ranking"], drifted["ranking"]);

	// The service serving traffic never needs the manifest.
	let fakes = FakeBackends::new(3);

	assert!(MnemoService::new(changed, fakes.clients()).is_ok());
}

#[test]
fn manifest_round_trips_through_json() {
	let manifest = lock();
	let encoded = serde_json::to_string_pretty(&manifest).expect("Failed to encode manifest.");
	let decoded: Manifest = serde_json::from_str(&encoded).expect("Failed to decode manifest.");

	assert_eq!(decoded, manifest);
	assert!(encoded.contains("\"timestamp\": \"2026-02-01T00:00:00Z\""));
}
