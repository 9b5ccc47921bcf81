use std::{sync::Arc, time::Duration};

use serde_json::{Map, Value};

use mnemo_providers::embedding::EmbeddingClient;
use mnemo_storage::{
	db::Db,
	graph::{GraphSchemaInfo, Neo4jStore, Row},
	kv::KvStore,
	models::KvEntry,
	qdrant::{QdrantStore, VectorHit, VectorSchemaInfo},
};

use crate::{BoxFuture, Result};

pub trait VectorClient
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		vector: Vec<f32>,
		filters: &'a Map<String, Value>,
		limit: u64,
	) -> BoxFuture<'a, mnemo_storage::Result<Vec<VectorHit>>>;

	fn health(&self) -> BoxFuture<'_, mnemo_storage::Result<()>>;

	fn schema(&self) -> BoxFuture<'_, mnemo_storage::Result<VectorSchemaInfo>>;
}

pub trait GraphClient
where
	Self: Send + Sync,
{
	fn run_read_only<'a>(
		&'a self,
		statement: &'a str,
		params: &'a Map<String, Value>,
	) -> BoxFuture<'a, mnemo_storage::Result<Vec<Row>>>;

	fn health(&self) -> BoxFuture<'_, mnemo_storage::Result<()>>;

	fn schema(&self) -> BoxFuture<'_, mnemo_storage::Result<GraphSchemaInfo>>;
}

pub trait KvClient
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, mnemo_storage::Result<Option<Value>>>;

	fn scan<'a>(
		&'a self,
		prefix: &'a str,
		limit: u32,
	) -> BoxFuture<'a, mnemo_storage::Result<Vec<KvEntry>>>;

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: &'a Value,
		ttl: Option<Duration>,
	) -> BoxFuture<'a, mnemo_storage::Result<()>>;

	fn health(&self) -> BoxFuture<'_, mnemo_storage::Result<()>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, mnemo_providers::Result<Vec<Vec<f32>>>>;
}

/// Remote collaborators the service talks to.
#[derive(Clone)]
pub struct Clients {
	pub vector: Arc<dyn VectorClient>,
	pub graph: Arc<dyn GraphClient>,
	pub kv: Arc<dyn KvClient>,
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Clients {
	/// Connects the production clients and bootstraps the key-value table.
	pub async fn connect(cfg: &mnemo_config::Config) -> Result<Self> {
		let vector = QdrantStore::new(&cfg.backends.vector)?;
		let graph = Neo4jStore::new(&cfg.backends.graph)?;
		let db = Db::connect(&cfg.backends.kv).await?;

		db.ensure_schema().await?;

		let embedding = EmbeddingClient::new(&cfg.providers.embedding)?;

		Ok(Self {
			vector: Arc::new(vector),
			graph: Arc::new(graph),
			kv: Arc::new(KvStore::new(db.pool)),
			embedding: Arc::new(embedding),
		})
	}
}

impl VectorClient for QdrantStore {
	fn search<'a>(
		&'a self,
		vector: Vec<f32>,
		filters: &'a Map<String, Value>,
		limit: u64,
	) -> BoxFuture<'a, mnemo_storage::Result<Vec<VectorHit>>> {
		Box::pin(QdrantStore::search(self, vector, filters, limit))
	}

	fn health(&self) -> BoxFuture<'_, mnemo_storage::Result<()>> {
		Box::pin(QdrantStore::health(self))
	}

	fn schema(&self) -> BoxFuture<'_, mnemo_storage::Result<VectorSchemaInfo>> {
		Box::pin(QdrantStore::schema(self))
	}
}

impl GraphClient for Neo4jStore {
	fn run_read_only<'a>(
		&'a self,
		statement: &'a str,
		params: &'a Map<String, Value>,
	) -> BoxFuture<'a, mnemo_storage::Result<Vec<Row>>> {
		Box::pin(Neo4jStore::run_read_only(self, statement, params))
	}

	fn health(&self) -> BoxFuture<'_, mnemo_storage::Result<()>> {
		Box::pin(Neo4jStore::health(self))
	}

	fn schema(&self) -> BoxFuture<'_, mnemo_storage::Result<GraphSchemaInfo>> {
		Box::pin(Neo4jStore::schema(self))
	}
}

impl KvClient for KvStore {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, mnemo_storage::Result<Option<Value>>> {
		Box::pin(KvStore::get(self, key))
	}

	fn scan<'a>(
		&'a self,
		prefix: &'a str,
		limit: u32,
	) -> BoxFuture<'a, mnemo_storage::Result<Vec<KvEntry>>> {
		Box::pin(KvStore::scan(self, prefix, limit))
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: &'a Value,
		ttl: Option<Duration>,
	) -> BoxFuture<'a, mnemo_storage::Result<()>> {
		Box::pin(KvStore::put(self, key, value, ttl))
	}

	fn health(&self) -> BoxFuture<'_, mnemo_storage::Result<()>> {
		Box::pin(KvStore::health(self))
	}
}

impl EmbeddingProvider for EmbeddingClient {
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, mnemo_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(EmbeddingClient::embed(self, texts))
	}
}
