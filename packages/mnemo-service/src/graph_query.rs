use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time;

use mnemo_domain::{cypher_gate, query::BackendKind};
use mnemo_storage::graph::Row;

use crate::{
	Error, MnemoService, Result,
	adapter::{AdapterError, storage_error},
};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GraphQueryRequest {
	pub query: String,
	#[serde(default)]
	pub params: Map<String, Value>,
	pub limit: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GraphQueryResponse {
	pub success: bool,
	pub rows: Vec<Row>,
	pub row_count: usize,
	pub message: String,
}
impl GraphQueryResponse {
	pub fn failure(message: impl Into<String>) -> Self {
		Self { success: false, rows: Vec::new(), row_count: 0, message: message.into() }
	}
}

impl MnemoService {
	/// Runs caller-supplied Cypher through the query gate and, only if accepted, against the
	/// graph backend in read mode.
	pub async fn graph_query(&self, req: GraphQueryRequest) -> Result<GraphQueryResponse> {
		let limit = req
			.limit
			.unwrap_or(self.cfg.dispatch.default_limit)
			.clamp(1, self.cfg.dispatch.max_limit) as usize;
		let validated = cypher_gate::cypher_gate(&req.query, &req.params, &self.cfg.validator)
			.map_err(|rejection| {
				tracing::warn!(
					code = rejection.code.as_str(),
					reason = %rejection.reason,
					"Graph query rejected."
				);

				Error::from(rejection)
			})?;

		if !self.health.status(BackendKind::Graph).is_routable() {
			return Err(Error::BackendUnavailable {
				backend: BackendKind::Graph,
				message: "Marked unavailable by the health tracker.".to_string(),
			});
		}

		let timeout = self.backend_timeout(BackendKind::Graph);
		let outcome =
			time::timeout(timeout, self.clients.graph.run_read_only(&validated.text, &validated.params))
				.await;
		let mut rows = match outcome {
			Ok(Ok(rows)) => {
				self.reporter.report(BackendKind::Graph, true);

				rows
			},
			Ok(Err(err)) => match storage_error(err) {
				AdapterError::MalformedQuery(message) => return Err(Error::InvalidRequest { message }),
				other => {
					self.reporter.report(BackendKind::Graph, false);

					return Err(Error::BackendUnavailable {
						backend: BackendKind::Graph,
						message: other.to_string(),
					});
				},
			},
			Err(_) => {
				self.reporter.report(BackendKind::Graph, false);

				return Err(Error::BackendTimeout {
					backend: BackendKind::Graph,
					timeout_ms: timeout.as_millis() as u64,
				});
			},
		};

		rows.truncate(limit);

		tracing::info!(
			clause_count = validated.clause_count,
			max_depth = validated.max_depth,
			row_count = rows.len(),
			"Graph query completed."
		);

		Ok(GraphQueryResponse {
			success: true,
			row_count: rows.len(),
			rows,
			message: crate::search::OK_MESSAGE.to_string(),
		})
	}
}
