use serde_json::{Map, Value, json};

use mnemo_config::Validator;
use mnemo_domain::cypher_gate::{RejectCode, cypher_gate};

fn params(value: Value) -> Map<String, Value> {
	value.as_object().cloned().unwrap_or_default()
}

fn reject_code(query: &str) -> RejectCode {
	cypher_gate(query, &Map::new(), &Validator::default())
		.expect_err("Query must be rejected.")
		.code
}

#[test]
fn accepts_read_only_clauses() {
	let query = "MATCH (n:Context) WHERE n.title CONTAINS $text WITH n ORDER BY n.id LIMIT 5 RETURN n";
	let validated = cypher_gate(query, &params(json!({ "text": "auth" })), &Validator::default())
		.expect("Read-only query must be accepted.");

	assert_eq!(validated.text, query);
	assert_eq!(validated.clause_count, 6);
	assert_eq!(validated.max_depth, 0);
	assert_eq!(validated.params.get("text"), Some(&json!("auth")));
}

#[test]
fn rejects_write_keywords_in_any_case() {
	for query in [
		"MATCH (n) CREATE (m)",
		"match (n) delete n",
		"MATCH (n) SeT n.x = 1",
		"MERGE (n:Context {id: 1})",
		"DROP INDEX context_title",
		"MATCH (n) REMOVE n.title",
	] {
		assert_eq!(reject_code(query), RejectCode::RejectWriteKeyword, "{query}");
	}
}

#[test]
fn rejects_detach_delete_before_anything_else() {
	let rejection = cypher_gate("MATCH (n) DETACH DELETE n", &Map::new(), &Validator::default())
		.expect_err("Query must be rejected.");

	assert_eq!(rejection.code, RejectCode::RejectWriteKeyword);
	assert!(rejection.reason.contains("DETACH"), "Unexpected reason: {}", rejection.reason);
}

#[test]
fn write_words_as_properties_and_labels_are_allowed() {
	let query = "MATCH (n:Set) WHERE n.delete = $flag RETURN n.create AS created";

	assert!(cypher_gate(query, &params(json!({ "flag": true })), &Validator::default()).is_ok());
}

#[test]
fn rejects_clauses_outside_allow_list() {
	assert_eq!(reject_code("MATCH (n) UNWIND n.tags AS tag RETURN tag"), RejectCode::RejectDisallowedClause);
	assert_eq!(reject_code("LOAD CSV FROM 'file:///x' AS row RETURN row"), RejectCode::RejectDisallowedClause);
	assert_eq!(reject_code("MATCH (n) CALL { MATCH (m) RETURN m } RETURN n"), RejectCode::RejectDisallowedClause);
	assert_eq!(
		reject_code("MATCH (n) RETURN n UNION MATCH (m) RETURN m"),
		RejectCode::RejectDisallowedClause
	);
}

#[test]
fn allows_only_whitelisted_procedures() {
	let cfg = Validator::default();

	assert!(cypher_gate("CALL db.labels() YIELD label RETURN label", &Map::new(), &cfg).is_ok());
	assert_eq!(
		cypher_gate("CALL apoc.cypher.runFile('x')", &Map::new(), &cfg)
			.expect_err("Procedure must be rejected.")
			.code,
		RejectCode::RejectDisallowedProcedure
	);
}

#[test]
fn starts_with_is_not_counted_as_a_clause() {
	let validated = cypher_gate(
		"MATCH (n) WHERE n.title STARTS WITH $prefix RETURN n",
		&params(json!({ "prefix": "py" })),
		&Validator::default(),
	)
	.expect("Query must be accepted.");

	assert_eq!(validated.clause_count, 3);
}

#[test]
fn enforces_clause_bound() {
	let cfg = Validator { max_clauses: 2, ..Validator::default() };
	let rejection = cypher_gate("MATCH (n) WHERE n.id = $id RETURN n", &params(json!({ "id": 1 })), &cfg)
		.expect_err("Query must be rejected.");

	assert_eq!(rejection.code, RejectCode::RejectTooComplex);
}

#[test]
fn measures_traversal_depth() {
	let cfg = Validator::default();
	let validated = cypher_gate("MATCH (a)-[:LINK*1..2]->(b)-->(c) RETURN c", &Map::new(), &cfg)
		.expect("Query must be accepted.");

	assert_eq!(validated.max_depth, 3);

	let rejection = cypher_gate("MATCH (a)-[*1..9]-(b) RETURN b", &Map::new(), &cfg)
		.expect_err("Query must be rejected.");

	assert_eq!(rejection.code, RejectCode::RejectTooDeep);
}

#[test]
fn rejects_unbounded_traversal() {
	assert_eq!(reject_code("MATCH (a)-[*]-(b) RETURN b"), RejectCode::RejectUnboundedTraversal);
	assert_eq!(reject_code("MATCH (a)-[:LINK*2..]-(b) RETURN b"), RejectCode::RejectUnboundedTraversal);
}

#[test]
fn rejects_interpolation_patterns() {
	assert_eq!(reject_code("MATCH (n) WHERE n.id = ${id} RETURN n"), RejectCode::RejectInjection);
	assert_eq!(reject_code("MATCH (n) WHERE n.id = {{id}} RETURN n"), RejectCode::RejectInjection);
	assert_eq!(reject_code("MATCH (n) WHERE n.id = %s RETURN n"), RejectCode::RejectInjection);
	assert_eq!(reject_code("MATCH (n) WHERE n.id = '%(id)s' RETURN n"), RejectCode::RejectInjection);
	assert_eq!(
		reject_code("MATCH (n) WHERE n.title = 'a' + n.x RETURN n"),
		RejectCode::RejectInjection
	);
}

#[test]
fn rejects_stacked_statements_and_comments() {
	assert_eq!(
		reject_code("MATCH (n) RETURN n; MATCH (m) RETURN m"),
		RejectCode::RejectMultipleStatements
	);
	assert_eq!(reject_code("MATCH (n) RETURN n // trailing"), RejectCode::RejectComment);

	let validated = cypher_gate("MATCH (n) RETURN n;", &Map::new(), &Validator::default())
		.expect("A trailing semicolon must be accepted.");

	assert_eq!(validated.text, "MATCH (n) RETURN n");
}

#[test]
fn string_literals_can_be_disabled() {
	let cfg = Validator { allow_string_literals: false, ..Validator::default() };

	assert_eq!(
		cypher_gate("MATCH (n) WHERE n.title = 'x' RETURN n", &Map::new(), &cfg)
			.expect_err("Literal must be rejected.")
			.code,
		RejectCode::RejectStringLiteral
	);
}

#[test]
fn requires_bound_parameters() {
	assert_eq!(reject_code("MATCH (n) WHERE n.id = $id RETURN n"), RejectCode::RejectMissingParam);
}

#[test]
fn rejects_empty_long_and_malformed_queries() {
	let cfg = Validator { max_query_chars: 16, ..Validator::default() };

	assert_eq!(reject_code("   "), RejectCode::RejectEmpty);
	assert_eq!(
		cypher_gate("MATCH (n) RETURN n.title", &Map::new(), &cfg)
			.expect_err("Query must be rejected.")
			.code,
		RejectCode::RejectTooLong
	);
	assert_eq!(reject_code("MATCH (n RETURN n"), RejectCode::RejectSyntax);
	assert_eq!(reject_code("MATCH (n) WHERE n.title = 'open RETURN n"), RejectCode::RejectSyntax);
	assert_eq!(reject_code("python authentication"), RejectCode::RejectSyntax);
}

#[test]
fn quantified_path_patterns_count_toward_depth() {
	let cfg = Validator::default();
	let validated = cypher_gate(
		"MATCH (a:Context)-[:LINK]->{1,2}(b:Context) RETURN b.id AS id",
		&Map::new(),
		&cfg,
	)
	.expect("Bounded quantifier must be accepted.");

	assert_eq!(validated.max_depth, 2);

	let validated =
		cypher_gate("MATCH ((x)-[:LINK]->(y)-->(z)){2} RETURN z", &Map::new(), &cfg)
			.expect("Bounded group must be accepted.");

	assert_eq!(validated.max_depth, 4);
	assert_eq!(
		reject_code("MATCH (a:Context)-[:LINK]->{1,500}(b:Context) RETURN b.id AS id"),
		RejectCode::RejectTooDeep
	);
	assert_eq!(
		reject_code("MATCH (a:Context) ((x)-[:LINK]->(y)){1,9} (b:Context) RETURN b.id AS id"),
		RejectCode::RejectTooDeep
	);
}

#[test]
fn open_ended_quantifiers_are_unbounded() {
	for query in [
		"MATCH (a:Context) ((x)-[:LINK]->(y))+ (b:Context) RETURN b.id AS id",
		"MATCH (a:Context) ((x)-[:LINK]->(y))* (b:Context) RETURN b.id AS id",
		"MATCH (a:Context)-[:LINK]->{1,}(b:Context) RETURN b.id AS id",
		"MATCH (a)-[:LINK]->+(b) RETURN b",
	] {
		assert_eq!(reject_code(query), RejectCode::RejectUnboundedTraversal, "{query}");
	}
}

#[test]
fn arithmetic_and_maps_are_not_quantifiers() {
	let cfg = Validator::default();

	for query in [
		"MATCH (n:Context {id: 1}) RETURN size(n.tags) * 2 AS weight",
		"MATCH (n WHERE size(n.tags) + 1 > 2)-[:LINK]->(m) RETURN m",
		"MATCH (n) WHERE size(n.tags) * 2 > 1 RETURN n",
	] {
		let validated = cypher_gate(query, &Map::new(), &cfg).expect("Query must be accepted.");

		assert!(validated.max_depth <= 1, "{query}");
	}
}

#[test]
fn clause_keywords_outside_the_read_set_are_rejected() {
	for query in [
		"MATCH (n) FINISH",
		"MATCH (n) RETURN n NEXT MATCH (m) RETURN m",
		"MATCH (n) FILTER n.id = 1 RETURN n",
		"MATCH (n) LET x = n.id RETURN x",
	] {
		assert_eq!(reject_code(query), RejectCode::RejectDisallowedClause, "{query}");
	}
}

#[test]
fn operators_and_expression_keywords_pass_the_allow_list() {
	let query = "MATCH (n:Context) WHERE n.status IS NOT NULL AND n.id IN $ids OR NOT n.title ENDS WITH $suffix \
		RETURN DISTINCT n.id AS id, CASE WHEN n.rank > 1 THEN 1 ELSE 0 END AS ranked ORDER BY id DESC SKIP 1 LIMIT 5";
	let validated =
		cypher_gate(query, &params(json!({ "ids": [1, 2], "suffix": "x" })), &Validator::default())
			.expect("Query must be accepted.");

	assert_eq!(validated.clause_count, 6);
}
