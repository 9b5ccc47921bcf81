use std::time::Duration;

use serde_json::{Map, Value, json};

use mnemo_domain::query::BackendKind;
use mnemo_service::{Error, GraphQueryRequest, HealthTracker, MnemoService};
use mnemo_testkit::{FakeBackends, fakes::graph_row};

const READ_QUERY: &str = "MATCH (n:Context) WHERE n.title STARTS WITH $prefix RETURN n.id AS id";

fn setup() -> (MnemoService, HealthTracker, FakeBackends) {
	let fakes = FakeBackends::new(3);
	let (service, tracker) = MnemoService::new(mnemo_testkit::test_config(), fakes.clients())
		.expect("Failed to build service.");

	(service, tracker, fakes)
}

fn prefix_params() -> Map<String, Value> {
	json!({ "prefix": "auth" }).as_object().cloned().unwrap_or_default()
}

fn read_request(limit: Option<u32>) -> GraphQueryRequest {
	GraphQueryRequest { query: READ_QUERY.to_string(), params: prefix_params(), limit }
}

#[tokio::test]
async fn write_query_is_rejected_before_any_backend_call() {
	let (service, _tracker, fakes) = setup();
	let err = service
		.graph_query(GraphQueryRequest {
			query: "MATCH (n) DETACH DELETE n".to_string(),
			..Default::default()
		})
		.await
		.expect_err("Write query must be rejected.");

	match err {
		Error::Validation { code, .. } => assert_eq!(code, "REJECT_WRITE_KEYWORD"),
		other => panic!("Unexpected error: {other:?}."),
	}

	assert_eq!(fakes.query_calls(), 0);
	assert!(fakes.graph.statements().is_empty());
}

#[tokio::test]
async fn accepted_query_runs_verbatim_and_truncates_rows() {
	let (service, _tracker, fakes) = setup();

	fakes.graph.set_rows(vec![
		graph_row("a", "Auth", 0, true),
		graph_row("b", "Auth tokens", 1, false),
		graph_row("c", "Auth sessions", 1, false),
	]);

	let response =
		service.graph_query(read_request(Some(2))).await.expect("Graph query failed.");

	assert!(response.success);
	assert_eq!(response.row_count, 2);
	assert_eq!(response.rows.len(), 2);
	assert_eq!(response.message, "ok");
	assert_eq!(response.rows[0].get("id"), Some(&Value::from("a")));
	assert_eq!(fakes.graph.statements(), vec![READ_QUERY.to_string()]);
	assert_eq!(fakes.vector.calls() + fakes.kv.calls(), 0);
}

#[tokio::test]
async fn unavailable_graph_fails_fast() {
	let (service, mut tracker, fakes) = setup();

	fakes.graph.fail_health("connection refused");
	tracker.probe_once().await;
	tracker.probe_once().await;

	let err = service.graph_query(read_request(None)).await.expect_err("Graph must be unavailable.");

	assert!(matches!(err, Error::BackendUnavailable { backend: BackendKind::Graph, .. }));
	assert_eq!(fakes.graph.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_graph_times_out() {
	let (service, _tracker, fakes) = setup();

	fakes.graph.set_latency(Duration::from_secs(2));

	let err = service.graph_query(read_request(None)).await.expect_err("Query must time out.");

	assert!(matches!(
		err,
		Error::BackendTimeout { backend: BackendKind::Graph, timeout_ms: 200 }
	));
}

#[tokio::test]
async fn statement_errors_are_the_callers_fault() {
	let (service, mut tracker, fakes) = setup();

	fakes.graph.reject_statements("Neo.ClientError.Statement.SyntaxError", "Invalid input.");

	for _ in 0..3 {
		let err = service.graph_query(read_request(None)).await.expect_err("Query must fail.");

		assert!(matches!(err, Error::InvalidRequest { .. }));
	}

	tracker.drain_outcomes();

	// Bad statements never trip the breaker.
	assert!(service.health().status(BackendKind::Graph).is_routable());
}

#[tokio::test]
async fn backend_errors_feed_the_breaker() {
	let (service, mut tracker, fakes) = setup();

	fakes.graph.fail("connection reset");

	for _ in 0..2 {
		let err = service.graph_query(read_request(None)).await.expect_err("Query must fail.");

		assert!(matches!(err, Error::BackendUnavailable { backend: BackendKind::Graph, .. }));
	}

	tracker.drain_outcomes();

	assert!(!service.health().status(BackendKind::Graph).is_routable());
}
