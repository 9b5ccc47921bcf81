use reqwest::{Client, header::HeaderValue};
use serde_json::{Map, Value};

use crate::{Error, Result};

const ACCESS_MODE_HEADER: &str = "access-mode";

/// Neo4j client over the HTTP transactional endpoint.
///
/// Every statement is sent as an auto-committed read transaction. The configured account is
/// expected to hold a read-only role.
#[derive(Clone)]
pub struct Neo4jStore {
	http: Client,
	endpoint: String,
	username: String,
	password: String,
}

/// Constraint and index names present in the graph database.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphSchemaInfo {
	pub constraints: Vec<String>,
	pub indexes: Vec<String>,
}

pub type Row = Map<String, Value>;

impl Neo4jStore {
	pub fn new(cfg: &mnemo_config::GraphBackend) -> Result<Self> {
		let http = Client::builder().build()?;
		let endpoint = format!("{}/db/{}/tx/commit", cfg.url.trim_end_matches('/'), cfg.database);

		Ok(Self {
			http,
			endpoint,
			username: cfg.username.clone(),
			password: cfg.password.clone(),
		})
	}

	pub async fn run_read_only(&self, statement: &str, params: &Map<String, Value>) -> Result<Vec<Row>> {
		let body = serde_json::json!({
			"statements": [{ "statement": statement, "parameters": params }],
		});
		let res = self
			.http
			.post(&self.endpoint)
			.basic_auth(&self.username, Some(&self.password))
			.header(ACCESS_MODE_HEADER, HeaderValue::from_static("READ"))
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		parse_tx_response(json)
	}

	pub async fn health(&self) -> Result<()> {
		let rows = self.run_read_only("RETURN 1 AS ok", &Map::new()).await?;

		if rows.is_empty() {
			return Err(Error::Decode("Health statement returned no rows.".to_string()));
		}

		Ok(())
	}

	pub async fn schema(&self) -> Result<GraphSchemaInfo> {
		let constraints = self.names("SHOW CONSTRAINTS YIELD name RETURN name").await?;
		let indexes = self.names("SHOW INDEXES YIELD name RETURN name").await?;

		Ok(GraphSchemaInfo { constraints, indexes })
	}

	async fn names(&self, statement: &str) -> Result<Vec<String>> {
		let rows = self.run_read_only(statement, &Map::new()).await?;
		let mut names = rows
			.iter()
			.filter_map(|row| row.get("name").and_then(Value::as_str).map(str::to_string))
			.collect::<Vec<_>>();

		names.sort();
		names.dedup();

		Ok(names)
	}
}

/// Turns a transactional endpoint response into column-keyed rows of the first result.
pub fn parse_tx_response(json: Value) -> Result<Vec<Row>> {
	if let Some(error) = json.get("errors").and_then(Value::as_array).and_then(|errors| errors.first())
	{
		let code = error.get("code").and_then(Value::as_str).unwrap_or("Unknown").to_string();
		let message = error.get("message").and_then(Value::as_str).unwrap_or_default().to_string();

		return Err(Error::Graph { code, message });
	}

	let Some(result) = json.get("results").and_then(Value::as_array).and_then(|r| r.first()) else {
		return Ok(Vec::new());
	};
	let columns = result
		.get("columns")
		.and_then(Value::as_array)
		.ok_or_else(|| Error::Decode("Graph result is missing columns.".to_string()))?
		.iter()
		.map(|column| column.as_str().map(str::to_string))
		.collect::<Option<Vec<_>>>()
		.ok_or_else(|| Error::Decode("Graph column names must be strings.".to_string()))?;
	let data = result.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
	let mut rows = Vec::with_capacity(data.len());

	for entry in data {
		let values = entry
			.get("row")
			.and_then(Value::as_array)
			.ok_or_else(|| Error::Decode("Graph data entry is missing row.".to_string()))?;

		if values.len() != columns.len() {
			return Err(Error::Decode(format!(
				"Graph row has {} values for {} columns.",
				values.len(),
				columns.len()
			)));
		}

		rows.push(columns.iter().cloned().zip(values.iter().cloned()).collect());
	}

	Ok(rows)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn parses_rows_by_column() {
		let json = json!({
			"results": [{
				"columns": ["id", "hops"],
				"data": [{ "row": ["a", 0], "meta": [] }, { "row": ["b", 2], "meta": [] }]
			}],
			"errors": []
		});
		let rows = parse_tx_response(json).expect("Parse failed.");

		assert_eq!(rows.len(), 2);
		assert_eq!(rows[1].get("id"), Some(&json!("b")));
		assert_eq!(rows[1].get("hops"), Some(&json!(2)));
	}

	#[test]
	fn surfaces_server_errors() {
		let json = json!({
			"results": [],
			"errors": [{
				"code": "Neo.ClientError.Statement.AccessMode",
				"message": "Writing in read access mode not allowed."
			}]
		});

		match parse_tx_response(json) {
			Err(Error::Graph { code, .. }) => assert_eq!(code, "Neo.ClientError.Statement.AccessMode"),
			other => panic!("Unexpected result: {other:?}"),
		}
	}

	#[test]
	fn rejects_ragged_rows() {
		let json = json!({ "results": [{ "columns": ["id"], "data": [{ "row": ["a", 1] }] }] });

		assert!(matches!(parse_tx_response(json), Err(Error::Decode(_))));
	}
}
