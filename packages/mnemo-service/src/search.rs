use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::{
	task::JoinSet,
	time::{self as tokio_time, Instant},
};
use uuid::Uuid;

use mnemo_domain::{
	cypher_gate,
	query::{BackendKind, SearchMode, mode_label},
	result::SearchResult,
};

use crate::{
	Error, MnemoService, Result,
	adapter::{AdapterError, AdapterQuery, BackendHit},
	cache::{self, FingerprintInput},
	ranking::{self, ShadowReport},
};

pub const OK_MESSAGE: &str = "ok";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub filters: Map<String, Value>,
	pub search_mode: Option<String>,
	pub limit: Option<u32>,
	pub policy: Option<String>,
	pub embedding: Option<Vec<f32>>,
	/// Optional read-only Cypher run by the graph backend instead of its text match.
	pub cypher: Option<String>,
	#[serde(default)]
	pub params: Map<String, Value>,
	pub kv_prefix: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SearchResponse {
	pub success: bool,
	pub results: Vec<SearchResult>,
	pub total_count: u64,
	pub search_mode_used: String,
	pub message: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub diagnostics: Vec<BackendDiagnostic>,
}
impl SearchResponse {
	/// Failure body with no results.
	pub fn failure(message: impl Into<String>) -> Self {
		Self {
			success: false,
			results: Vec::new(),
			total_count: 0,
			search_mode_used: String::new(),
			message: message.into(),
			diagnostics: Vec::new(),
		}
	}

	pub fn is_degraded(&self) -> bool {
		self.success && !self.diagnostics.is_empty()
	}
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
	/// Excluded at selection time by the health tracker.
	Skipped,
	Unavailable,
	Timeout,
	MalformedQuery,
}

/// Why a selected or requested backend did not contribute.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BackendDiagnostic {
	pub backend: BackendKind,
	pub kind: DiagnosticKind,
	pub message: String,
}
impl BackendDiagnostic {
	fn note(&self) -> String {
		format!("{}: {}", self.backend, self.message)
	}

	fn from_adapter_error(backend: BackendKind, err: &AdapterError) -> Self {
		let kind = match err {
			AdapterError::Unavailable(_) => DiagnosticKind::Unavailable,
			AdapterError::Timeout(_) => DiagnosticKind::Timeout,
			AdapterError::MalformedQuery(_) => DiagnosticKind::MalformedQuery,
		};

		Self { backend, kind, message: err.to_string() }
	}
}

impl MnemoService {
	/// Hybrid search: select backends by health, query them in parallel under per-backend
	/// timeouts and a request deadline, then merge and rank whatever arrived.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let started = Instant::now();
		let request_id = Uuid::new_v4();
		let mode = match req.search_mode.as_deref() {
			Some(raw) => raw.parse::<SearchMode>().map_err(|message| Error::InvalidRequest { message })?,
			None => SearchMode::default(),
		};
		let limit = req
			.limit
			.unwrap_or(self.cfg.dispatch.default_limit)
			.clamp(1, self.cfg.dispatch.max_limit);
		let policy = ranking::resolve_policy(&self.cfg.ranking, req.policy.as_deref())?;
		let shadow = ranking::resolve_shadow_policy(&self.cfg.ranking)?
			.filter(|shadow| shadow.name != policy.name);
		let cypher = req.cypher.as_deref().map(str::trim).filter(|cypher| !cypher.is_empty());
		let kv_prefix = req.kv_prefix.as_deref().map(str::trim).filter(|prefix| !prefix.is_empty());

		if req.query.trim().is_empty() && req.embedding.is_none() && cypher.is_none() && kv_prefix.is_none()
		{
			return Err(Error::InvalidRequest {
				message: "query must be non-empty unless an embedding, cypher, or kv_prefix is given."
					.to_string(),
			});
		}

		let graph_query = match cypher {
			Some(cypher) => Some(cypher_gate::cypher_gate(cypher, &req.params, &self.cfg.validator).map_err(
				|rejection| {
					tracing::warn!(
						%request_id,
						code = rejection.code.as_str(),
						reason = %rejection.reason,
						"Graph query rejected."
					);

					Error::from(rejection)
				},
			)?),
			None => None,
		};
		let (selected, mut diagnostics) = self.select_backends(mode)?;
		let policy_hash = ranking::hash_policy_snapshot(&ranking::build_policy_snapshot(&policy))?;
		let cache_key = if self.cfg.cache.enabled {
			let fingerprint = cache::fingerprint(&FingerprintInput {
				query: &req.query,
				mode: mode.as_str(),
				limit,
				policy_hash: &policy_hash,
				filters: &req.filters,
				embedding: req.embedding.as_deref(),
				cypher,
				params: &req.params,
				kv_prefix,
			})?;

			Some(cache::cache_key(&fingerprint))
		} else {
			None
		};

		// A cached answer was built with every selected backend healthy.
		if let Some(key) = cache_key.as_deref()
			&& diagnostics.is_empty()
			&& let Some(cached) = self.read_cache(key).await
		{
			tracing::info!(
				%request_id,
				mode = mode.as_str(),
				cache_key = cache::cache_key_prefix(key),
				result_count = cached.results.len(),
				"Served search from cache."
			);

			return Ok(cached);
		}

		let query = Arc::new(AdapterQuery {
			text: req.query.trim().to_string(),
			filters: req.filters,
			limit,
			embedding: req.embedding,
			graph_query,
			kv_prefix: kv_prefix.map(str::to_string),
		});
		let outcomes = self.fan_out(&selected, query).await;
		let mut hits: Vec<(BackendKind, BackendHit)> = Vec::new();
		let mut succeeded = Vec::new();
		let mut contributed = Vec::new();
		let mut failures = Vec::new();

		for (kind, outcome) in outcomes {
			match outcome {
				Ok(backend_hits) => {
					self.reporter.report(kind, true);
					succeeded.push(kind);

					if !backend_hits.is_empty() {
						contributed.push(kind);
					}

					hits.extend(backend_hits.into_iter().map(|hit| (kind, hit)));
				},
				Err(err) => {
					if !matches!(err, AdapterError::MalformedQuery(_)) {
						self.reporter.report(kind, false);
					}

					tracing::warn!(%request_id, backend = %kind, error = %err, "Backend call failed.");

					failures.push(err.clone());
					diagnostics.push(BackendDiagnostic::from_adapter_error(kind, &err));
				},
			}
		}

		if succeeded.is_empty() {
			let notes = diagnostics.iter().map(BackendDiagnostic::note).collect::<Vec<_>>();

			if !failures.is_empty()
				&& failures.iter().all(|err| matches!(err, AdapterError::MalformedQuery(_)))
			{
				return Err(Error::InvalidRequest { message: notes.join(" ") });
			}

			tracing::warn!(%request_id, mode = mode.as_str(), "All selected backends failed.");

			return Err(Error::AllBackendsFailed { notes });
		}

		let now = OffsetDateTime::now_utc();
		let candidates = ranking::merge_hits(hits);
		let ranked = ranking::rank(&policy, &candidates, limit as usize, now);

		if let Some(shadow) = shadow {
			let shadow_ranked = ranking::rank(&shadow, &candidates, limit as usize, now);

			log_shadow(
				request_id,
				&ranking::shadow_report(&policy.name, &shadow.name, &ranked, &shadow_ranked),
			);
		}

		let used = if contributed.is_empty() { &succeeded } else { &contributed };
		let search_mode_used = mode_label(used);
		let message = if diagnostics.is_empty() {
			OK_MESSAGE.to_string()
		} else {
			format!(
				"Degraded: {}",
				diagnostics.iter().map(BackendDiagnostic::note).collect::<Vec<_>>().join(" ")
			)
		};
		let response = SearchResponse {
			success: true,
			results: ranked.into_iter().map(ranking::RankedItem::into_result).collect(),
			total_count: candidates.len() as u64,
			search_mode_used,
			message,
			diagnostics,
		};

		if let Some(key) = cache_key.as_deref()
			&& !response.is_degraded()
		{
			self.write_cache(key, &response).await;
		}

		tracing::info!(
			%request_id,
			mode = mode.as_str(),
			backends_used = %response.search_mode_used,
			result_count = response.results.len(),
			total_count = response.total_count,
			elapsed_ms = started.elapsed().as_millis() as u64,
			"Search completed."
		);

		Ok(response)
	}

	/// Routable backends for the mode, plus a diagnostic for each requested one that is not.
	fn select_backends(&self, mode: SearchMode) -> Result<(Vec<BackendKind>, Vec<BackendDiagnostic>)> {
		let mut selected = Vec::new();
		let mut diagnostics = Vec::new();

		for kind in mode.requested_backends() {
			if self.health.status(kind).is_routable() {
				selected.push(kind);

				continue;
			}

			tracing::warn!(backend = %kind, "Skipping unavailable backend.");

			diagnostics.push(BackendDiagnostic {
				backend: kind,
				kind: DiagnosticKind::Skipped,
				message: "Marked unavailable by the health tracker.".to_string(),
			});
		}

		if selected.is_empty() {
			if let ([kind], true) = (mode.requested_backends().as_slice(), mode.is_explicit()) {
				return Err(Error::BackendUnavailable {
					backend: *kind,
					message: "Marked unavailable by the health tracker.".to_string(),
				});
			}

			return Err(Error::AllBackendsFailed {
				notes: diagnostics.iter().map(BackendDiagnostic::note).collect(),
			});
		}

		Ok((selected, diagnostics))
	}

	/// One task per backend. Tasks still running at the request deadline are aborted and
	/// recorded as timeouts.
	async fn fan_out(
		&self,
		selected: &[BackendKind],
		query: Arc<AdapterQuery>,
	) -> BTreeMap<BackendKind, Result<Vec<BackendHit>, AdapterError>> {
		let deadline_ms = self.cfg.dispatch.request_deadline_ms;
		let deadline = Instant::now() + Duration::from_millis(deadline_ms);
		let mut tasks = JoinSet::new();
		let mut outcomes = BTreeMap::new();

		for kind in selected {
			let Some(adapter) = self.adapters.get(kind).cloned() else {
				outcomes.insert(*kind, Err(AdapterError::Unavailable("No adapter configured.".to_string())));

				continue;
			};
			let query = Arc::clone(&query);
			let timeout = self.backend_timeout(*kind);
			let kind = *kind;

			tasks.spawn(async move { (kind, adapter.query(&query, timeout).await) });
		}

		let mut deadline_hit = false;

		loop {
			match tokio_time::timeout_at(deadline, tasks.join_next()).await {
				Ok(Some(Ok((kind, outcome)))) => {
					outcomes.insert(kind, outcome);
				},
				Ok(Some(Err(err))) => tracing::error!(error = %err, "Backend task failed."),
				Ok(None) => break,
				Err(_) => {
					deadline_hit = true;

					tasks.abort_all();

					break;
				},
			}
		}

		for kind in selected {
			outcomes.entry(*kind).or_insert_with(|| {
				if deadline_hit {
					Err(AdapterError::Timeout(deadline_ms))
				} else {
					Err(AdapterError::Unavailable("Backend task did not complete.".to_string()))
				}
			});
		}

		outcomes
	}

	async fn read_cache(&self, key: &str) -> Option<SearchResponse> {
		if !self.health.status(BackendKind::Kv).is_routable() {
			return None;
		}

		let timeout = self.backend_timeout(BackendKind::Kv);

		match tokio_time::timeout(timeout, self.clients.kv.get(key)).await {
			Ok(Ok(Some(value))) => match serde_json::from_value::<SearchResponse>(value) {
				Ok(response) => Some(response),
				Err(err) => {
					tracing::warn!(
						error = %err,
						cache_key = cache::cache_key_prefix(key),
						"Cached search response is invalid."
					);

					None
				},
			},
			Ok(Ok(None)) => None,
			Ok(Err(err)) => {
				tracing::warn!(error = %err, "Search cache read failed.");

				None
			},
			Err(_) => {
				tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Search cache read timed out.");

				None
			},
		}
	}

	async fn write_cache(&self, key: &str, response: &SearchResponse) {
		let value = match serde_json::to_value(response) {
			Ok(value) => value,
			Err(err) => {
				tracing::warn!(error = %err, "Failed to encode search response for cache.");

				return;
			},
		};
		let ttl = Duration::from_secs(self.cfg.cache.ttl_secs);
		let timeout = self.backend_timeout(BackendKind::Kv);

		match tokio_time::timeout(timeout, self.clients.kv.put(key, &value, Some(ttl))).await {
			Ok(Ok(())) => {},
			Ok(Err(err)) => tracing::warn!(error = %err, "Search cache write failed."),
			Err(_) => tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Search cache write timed out."),
		}
	}
}

fn log_shadow(request_id: Uuid, report: &ShadowReport) {
	tracing::info!(
		%request_id,
		active_policy = %report.active_policy,
		shadow_policy = %report.shadow_policy,
		k = report.k,
		overlap_at_k = report.overlap_at_k,
		churn_at_k = report.churn_at_k,
		active_top = ?report.active_top,
		shadow_top = ?report.shadow_top,
		"Shadow ranking evaluated."
	);
}
