pub mod adapter;
pub mod cache;
pub mod clients;
pub mod graph_query;
pub mod health;
pub mod manifest;
pub mod ranking;
pub mod search;

mod error;

pub use clients::{Clients, EmbeddingProvider, GraphClient, KvClient, VectorClient};
pub use error::{Error, Result};
pub use graph_query::{GraphQueryRequest, GraphQueryResponse};
pub use health::{HealthReporter, HealthTracker, HealthView};
pub use manifest::{Manifest, ParityReport};
pub use search::{BackendDiagnostic, DiagnosticKind, SearchRequest, SearchResponse};

use std::{collections::BTreeMap, future::Future, pin::Pin, sync::Arc, time::Duration};

use mnemo_config::Config;
use mnemo_domain::query::BackendKind;

use crate::adapter::{BackendAdapter, GraphAdapter, KvAdapter, VectorAdapter};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct MnemoService {
	pub cfg: Config,
	clients: Clients,
	adapters: BTreeMap<BackendKind, Arc<dyn BackendAdapter>>,
	health: HealthView,
	reporter: HealthReporter,
}
impl MnemoService {
	/// Wires the three adapters and returns the health tracker that must be driven alongside
	/// the service, either with [`HealthTracker::run`] or manually in tests.
	pub fn new(cfg: Config, clients: Clients) -> Result<(Self, HealthTracker)> {
		let vector_timeout = backend_timeout(&cfg, BackendKind::Vector);
		let graph_timeout = backend_timeout(&cfg, BackendKind::Graph);
		let kv_timeout = backend_timeout(&cfg, BackendKind::Kv);
		let vector: Arc<dyn BackendAdapter> = Arc::new(VectorAdapter::new(
			&cfg.backends.vector,
			Arc::clone(&clients.vector),
			Arc::clone(&clients.embedding),
			vector_timeout,
		));
		let graph: Arc<dyn BackendAdapter> =
			Arc::new(GraphAdapter::new(&cfg, Arc::clone(&clients.graph), graph_timeout)?);
		let kv: Arc<dyn BackendAdapter> = Arc::new(KvAdapter::new(Arc::clone(&clients.kv), kv_timeout));
		let adapters = BTreeMap::from([
			(BackendKind::Vector, vector),
			(BackendKind::Graph, graph),
			(BackendKind::Kv, kv),
		]);
		let (tracker, health, reporter) =
			health::health_channel(adapters.values().cloned().collect(), &cfg.health);

		Ok((Self { cfg, clients, adapters, health, reporter }, tracker))
	}

	pub fn health(&self) -> &HealthView {
		&self.health
	}

	pub(crate) fn backend_timeout(&self, kind: BackendKind) -> Duration {
		backend_timeout(&self.cfg, kind)
	}
}

/// Per-backend override, falling back to the dispatch-wide budget.
pub fn backend_timeout(cfg: &Config, kind: BackendKind) -> Duration {
	let override_ms = match kind {
		BackendKind::Vector => cfg.backends.vector.timeout_ms,
		BackendKind::Graph => cfg.backends.graph.timeout_ms,
		BackendKind::Kv => cfg.backends.kv.timeout_ms,
	};

	Duration::from_millis(override_ms.unwrap_or(cfg.dispatch.backend_timeout_ms))
}
