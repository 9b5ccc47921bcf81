//! Scripted in-memory backend clients.

use std::{
	collections::BTreeMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::{Map, Value};
use time::OffsetDateTime;

use mnemo_service::{
	BoxFuture, Clients, EmbeddingProvider, GraphClient, KvClient, VectorClient,
};
use mnemo_storage::{
	graph::{GraphSchemaInfo, Row},
	models::KvEntry,
	qdrant::{VectorHit, VectorSchemaInfo},
};

/// Latency and failure applied to every call of one kind.
#[derive(Clone, Debug, Default)]
pub struct Script {
	pub latency: Duration,
	pub failure: Option<String>,
}
impl Script {
	async fn play(self) -> mnemo_storage::Result<()> {
		if !self.latency.is_zero() {
			tokio::time::sleep(self.latency).await;
		}

		match self.failure {
			Some(message) => Err(mnemo_storage::Error::Decode(message)),
			None => Ok(()),
		}
	}
}

/// Query and health scripts shared by every fake.
#[derive(Default)]
struct Scripts {
	query: Mutex<Script>,
	health: Mutex<Script>,
}
impl Scripts {
	fn query(&self) -> Script {
		self.query.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn health(&self) -> Script {
		self.health.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn edit_query(&self, f: impl FnOnce(&mut Script)) {
		f(&mut self.query.lock().unwrap_or_else(|err| err.into_inner()));
	}

	fn edit_health(&self, f: impl FnOnce(&mut Script)) {
		f(&mut self.health.lock().unwrap_or_else(|err| err.into_inner()));
	}
}

macro_rules! scripted {
	($ty:ty) => {
		impl $ty {
			/// Delay applied to every query call.
			pub fn set_latency(&self, latency: Duration) {
				self.scripts.edit_query(|script| script.latency = latency);
			}

			/// Makes every query call fail with `message`.
			pub fn fail(&self, message: &str) {
				self.scripts.edit_query(|script| script.failure = Some(message.to_string()));
			}

			pub fn recover(&self) {
				self.scripts.edit_query(|script| *script = Script::default());
			}

			pub fn set_health_latency(&self, latency: Duration) {
				self.scripts.edit_health(|script| script.latency = latency);
			}

			pub fn fail_health(&self, message: &str) {
				self.scripts.edit_health(|script| script.failure = Some(message.to_string()));
			}

			pub fn heal(&self) {
				self.scripts.edit_health(|script| *script = Script::default());
			}

			/// Query calls made so far, health checks excluded.
			pub fn calls(&self) -> usize {
				self.calls.load(Ordering::SeqCst)
			}

			pub fn health_calls(&self) -> usize {
				self.health_calls.load(Ordering::SeqCst)
			}
		}
	};
}

pub fn vector_hit(id: &str, raw_score: f32, text: &str) -> VectorHit {
	let mut payload = Map::new();

	payload.insert("text".to_string(), Value::from(text));
	payload.insert("type".to_string(), Value::from("note"));

	VectorHit { id: id.to_string(), raw_score, payload }
}

pub fn graph_row(id: &str, title: &str, hops: u64, exact: bool) -> Row {
	let mut row = Map::new();

	row.insert("id".to_string(), Value::from(id));
	row.insert("title".to_string(), Value::from(title));
	row.insert("content".to_string(), Value::from(format!("{title} details")));
	row.insert("type".to_string(), Value::from("note"));
	row.insert("hops".to_string(), Value::from(hops));
	row.insert("exact".to_string(), Value::from(u64::from(exact)));

	row
}

#[derive(Default)]
pub struct FakeVector {
	hits: Mutex<Vec<VectorHit>>,
	schema: Mutex<VectorSchemaInfo>,
	last_vector: Mutex<Option<Vec<f32>>>,
	scripts: Scripts,
	calls: AtomicUsize,
	health_calls: AtomicUsize,
}
impl FakeVector {
	pub fn set_hits(&self, hits: Vec<VectorHit>) {
		*self.hits.lock().unwrap_or_else(|err| err.into_inner()) = hits;
	}

	pub fn set_schema(&self, schema: VectorSchemaInfo) {
		*self.schema.lock().unwrap_or_else(|err| err.into_inner()) = schema;
	}

	pub fn last_vector(&self) -> Option<Vec<f32>> {
		self.last_vector.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
scripted!(FakeVector);

impl VectorClient for FakeVector {
	fn search<'a>(
		&'a self,
		vector: Vec<f32>,
		_filters: &'a Map<String, Value>,
		limit: u64,
	) -> BoxFuture<'a, mnemo_storage::Result<Vec<VectorHit>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);
			*self.last_vector.lock().unwrap_or_else(|err| err.into_inner()) = Some(vector);

			self.scripts.query().play().await?;

			let mut hits = self.hits.lock().unwrap_or_else(|err| err.into_inner()).clone();

			hits.sort_by(|a, b| b.raw_score.total_cmp(&a.raw_score));
			hits.truncate(limit as usize);

			Ok(hits)
		})
	}

	fn health(&self) -> BoxFuture<'_, mnemo_storage::Result<()>> {
		Box::pin(async move {
			self.health_calls.fetch_add(1, Ordering::SeqCst);

			self.scripts.health().play().await
		})
	}

	fn schema(&self) -> BoxFuture<'_, mnemo_storage::Result<VectorSchemaInfo>> {
		Box::pin(async move { Ok(self.schema.lock().unwrap_or_else(|err| err.into_inner()).clone()) })
	}
}

#[derive(Default)]
pub struct FakeGraph {
	rows: Mutex<Vec<Row>>,
	schema: Mutex<GraphSchemaInfo>,
	statements: Mutex<Vec<String>>,
	statement_error: Mutex<Option<(String, String)>>,
	scripts: Scripts,
	calls: AtomicUsize,
	health_calls: AtomicUsize,
}
impl FakeGraph {
	pub fn set_rows(&self, rows: Vec<Row>) {
		*self.rows.lock().unwrap_or_else(|err| err.into_inner()) = rows;
	}

	pub fn set_schema(&self, schema: GraphSchemaInfo) {
		*self.schema.lock().unwrap_or_else(|err| err.into_inner()) = schema;
	}

	/// Makes every query fail the way Neo4j reports a rejected statement.
	pub fn reject_statements(&self, code: &str, message: &str) {
		*self.statement_error.lock().unwrap_or_else(|err| err.into_inner()) =
			Some((code.to_string(), message.to_string()));
	}

	/// Statements received by `run_read_only`, in call order.
	pub fn statements(&self) -> Vec<String> {
		self.statements.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
scripted!(FakeGraph);

impl GraphClient for FakeGraph {
	fn run_read_only<'a>(
		&'a self,
		statement: &'a str,
		_params: &'a Map<String, Value>,
	) -> BoxFuture<'a, mnemo_storage::Result<Vec<Row>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.statements.lock().unwrap_or_else(|err| err.into_inner()).push(statement.to_string());

			self.scripts.query().play().await?;

			if let Some((code, message)) =
				self.statement_error.lock().unwrap_or_else(|err| err.into_inner()).clone()
			{
				return Err(mnemo_storage::Error::Graph { code, message });
			}

			Ok(self.rows.lock().unwrap_or_else(|err| err.into_inner()).clone())
		})
	}

	fn health(&self) -> BoxFuture<'_, mnemo_storage::Result<()>> {
		Box::pin(async move {
			self.health_calls.fetch_add(1, Ordering::SeqCst);

			self.scripts.health().play().await
		})
	}

	fn schema(&self) -> BoxFuture<'_, mnemo_storage::Result<GraphSchemaInfo>> {
		Box::pin(async move { Ok(self.schema.lock().unwrap_or_else(|err| err.into_inner()).clone()) })
	}
}

#[derive(Default)]
pub struct FakeKv {
	entries: Mutex<BTreeMap<String, Value>>,
	scripts: Scripts,
	calls: AtomicUsize,
	health_calls: AtomicUsize,
	puts: AtomicUsize,
}
impl FakeKv {
	pub fn insert(&self, key: &str, value: Value) {
		self.entries.lock().unwrap_or_else(|err| err.into_inner()).insert(key.to_string(), value);
	}

	pub fn value(&self, key: &str) -> Option<Value> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner()).get(key).cloned()
	}

	pub fn keys(&self) -> Vec<String> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner()).keys().cloned().collect()
	}

	pub fn puts(&self) -> usize {
		self.puts.load(Ordering::SeqCst)
	}
}
scripted!(FakeKv);

impl KvClient for FakeKv {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, mnemo_storage::Result<Option<Value>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			self.scripts.query().play().await?;

			Ok(self.value(key))
		})
	}

	fn scan<'a>(
		&'a self,
		prefix: &'a str,
		limit: u32,
	) -> BoxFuture<'a, mnemo_storage::Result<Vec<KvEntry>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			self.scripts.query().play().await?;

			let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

			Ok(entries
				.range(prefix.to_string()..)
				.take_while(|(key, _)| key.starts_with(prefix))
				.take(limit as usize)
				.map(|(key, value)| KvEntry {
					key: key.clone(),
					value: value.clone(),
					expires_at: None,
					updated_at: OffsetDateTime::UNIX_EPOCH,
				})
				.collect())
		})
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: &'a Value,
		_ttl: Option<Duration>,
	) -> BoxFuture<'a, mnemo_storage::Result<()>> {
		Box::pin(async move {
			self.puts.fetch_add(1, Ordering::SeqCst);

			self.scripts.query().play().await?;
			self.insert(key, value.clone());

			Ok(())
		})
	}

	fn health(&self) -> BoxFuture<'_, mnemo_storage::Result<()>> {
		Box::pin(async move {
			self.health_calls.fetch_add(1, Ordering::SeqCst);

			self.scripts.health().play().await
		})
	}
}

/// Returns the same unit-ish vector for every text.
pub struct FakeEmbedding {
	dim: usize,
	calls: AtomicUsize,
}
impl FakeEmbedding {
	pub fn new(dim: usize) -> Self {
		Self { dim, calls: AtomicUsize::new(0) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

impl EmbeddingProvider for FakeEmbedding {
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, mnemo_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let value = 1.0 / (self.dim.max(1) as f32).sqrt();

			Ok(texts.iter().map(|_| vec![value; self.dim]).collect())
		})
	}
}

/// One fake per backend, shared with the [`Clients`] handed to the service.
#[derive(Clone)]
pub struct FakeBackends {
	pub vector: Arc<FakeVector>,
	pub graph: Arc<FakeGraph>,
	pub kv: Arc<FakeKv>,
	pub embedding: Arc<FakeEmbedding>,
}
impl FakeBackends {
	pub fn new(dim: usize) -> Self {
		Self {
			vector: Arc::new(FakeVector::default()),
			graph: Arc::new(FakeGraph::default()),
			kv: Arc::new(FakeKv::default()),
			embedding: Arc::new(FakeEmbedding::new(dim)),
		}
	}

	pub fn clients(&self) -> Clients {
		Clients {
			vector: self.vector.clone(),
			graph: self.graph.clone(),
			kv: self.kv.clone(),
			embedding: self.embedding.clone(),
		}
	}

	/// Query calls across every backend, health checks excluded.
	pub fn query_calls(&self) -> usize {
		self.vector.calls() + self.graph.calls() + self.kv.calls()
	}
}
