use std::{
	collections::BTreeMap,
	sync::{Arc, RwLock},
	time::Duration,
};

use time::OffsetDateTime;
use tokio::{
	sync::{mpsc, watch},
	task::JoinSet,
	time::{self as tokio_time, Instant, MissedTickBehavior},
};

use mnemo_domain::{
	health::{BackendHealth, HealthStatus},
	query::BackendKind,
};

use crate::adapter::{BackendAdapter, HealthProbe};

/// Read side of the backend health map. Cheap to clone; readers never wait on probes.
#[derive(Clone)]
pub struct HealthView {
	inner: Arc<RwLock<BTreeMap<BackendKind, BackendHealth>>>,
}
impl HealthView {
	fn new() -> Self {
		let map = BackendKind::ALL.into_iter().map(|kind| (kind, BackendHealth::initial(kind))).collect();

		Self { inner: Arc::new(RwLock::new(map)) }
	}

	/// Current state of every backend in canonical order.
	pub fn snapshot(&self) -> Vec<BackendHealth> {
		let guard = self.inner.read().unwrap_or_else(|err| err.into_inner());

		guard.values().cloned().collect()
	}

	pub fn status(&self, kind: BackendKind) -> HealthStatus {
		let guard = self.inner.read().unwrap_or_else(|err| err.into_inner());

		guard.get(&kind).map(|health| health.status).unwrap_or(HealthStatus::Unavailable)
	}

	fn update<F>(&self, kind: BackendKind, f: F)
	where
		F: FnOnce(&mut BackendHealth),
	{
		let mut guard = self.inner.write().unwrap_or_else(|err| err.into_inner());
		let entry = guard.entry(kind).or_insert_with(|| BackendHealth::initial(kind));

		f(entry);
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CallOutcome {
	pub backend: BackendKind,
	pub success: bool,
}

/// Write side handed to the dispatcher. Outcomes are applied by the tracker, never here.
#[derive(Clone)]
pub struct HealthReporter {
	tx: mpsc::UnboundedSender<CallOutcome>,
}
impl HealthReporter {
	pub fn report(&self, backend: BackendKind, success: bool) {
		// A stopped tracker just means nobody consumes breaker feedback anymore.
		let _ = self.tx.send(CallOutcome { backend, success });
	}
}

/// Single writer of backend health. Runs probes on a fixed interval and folds in live call
/// outcomes to drive a per-backend circuit breaker.
pub struct HealthTracker {
	adapters: Vec<Arc<dyn BackendAdapter>>,
	view: HealthView,
	outcomes: mpsc::UnboundedReceiver<CallOutcome>,
	cfg: mnemo_config::Health,
	open_until: BTreeMap<BackendKind, Instant>,
}
impl HealthTracker {
	pub fn view(&self) -> HealthView {
		self.view.clone()
	}

	/// Probes every backend whose breaker is closed or whose cooldown has elapsed.
	pub async fn probe_once(&mut self) {
		let now = Instant::now();
		let mut probes = JoinSet::new();

		for adapter in &self.adapters {
			let kind = adapter.kind();

			if self.open_until.get(&kind).is_some_and(|until| *until > now) {
				tracing::debug!(backend = %kind, "Skipping probe while breaker is open.");

				continue;
			}

			let adapter = Arc::clone(adapter);

			probes.spawn(async move { (kind, adapter.health_check().await) });
		}

		while let Some(joined) = probes.join_next().await {
			match joined {
				Ok((kind, probe)) => self.apply_probe(kind, probe),
				Err(err) => tracing::error!(error = %err, "Health probe task failed."),
			}
		}
	}

	/// Applies every call outcome queued so far.
	pub fn drain_outcomes(&mut self) {
		while let Ok(outcome) = self.outcomes.try_recv() {
			self.apply_outcome(outcome);
		}
	}

	pub fn apply_outcome(&mut self, outcome: CallOutcome) {
		if self.open_until.get(&outcome.backend).is_some_and(|until| *until > Instant::now()) {
			return;
		}

		if outcome.success {
			self.view.update(outcome.backend, |health| health.consecutive_failures = 0);
		} else {
			self.record_failure(outcome.backend, None);
		}
	}

	/// Runs until `shutdown` flips to `true` or its sender is dropped.
	pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
		let mut interval = tokio_time::interval(Duration::from_secs(self.cfg.probe_interval_secs));

		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		tracing::info!(interval_secs = self.cfg.probe_interval_secs, "Health tracker started.");

		loop {
			tokio::select! {
				_ = interval.tick() => self.probe_once().await,
				Some(outcome) = self.outcomes.recv() => self.apply_outcome(outcome),
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						break;
					}
				},
			}
		}

		tracing::info!("Health tracker stopped.");
	}

	fn apply_probe(&mut self, kind: BackendKind, probe: HealthProbe) {
		let latency_ms = probe.latency.as_millis() as u64;

		if !probe.status.is_routable() {
			self.record_failure(kind, Some((latency_ms, probe.detail)));

			return;
		}

		let status = if latency_ms > self.cfg.degraded_latency_ms {
			HealthStatus::Degraded
		} else {
			HealthStatus::Healthy
		};

		self.open_until.remove(&kind);
		self.transition(kind, None, |health| {
			health.status = status;
			health.consecutive_failures = 0;
			health.latency_ms = Some(latency_ms);
			health.last_checked = Some(OffsetDateTime::now_utc());
		});
	}

	/// `probe` carries latency and detail when the failure came from a health check.
	fn record_failure(&mut self, kind: BackendKind, probe: Option<(u64, Option<String>)>) {
		let threshold = self.cfg.failure_threshold;
		let mut tripped = false;
		let detail = probe.as_ref().and_then(|(_, detail)| detail.clone());

		self.transition(kind, detail, |health| {
			health.consecutive_failures = health.consecutive_failures.saturating_add(1);

			if health.consecutive_failures >= threshold {
				health.status = HealthStatus::Unavailable;
				tripped = true;
			} else {
				health.status = HealthStatus::Degraded;
			}

			if let Some((latency_ms, _)) = probe {
				health.latency_ms = Some(latency_ms);
				health.last_checked = Some(OffsetDateTime::now_utc());
			}
		});

		if tripped {
			self.open_until.insert(kind, Instant::now() + Duration::from_secs(self.cfg.cooldown_secs));
		}
	}

	fn transition<F>(&self, kind: BackendKind, detail: Option<String>, f: F)
	where
		F: FnOnce(&mut BackendHealth),
	{
		let before = self.view.status(kind);
		let mut after = before;
		let mut failures = 0;

		self.view.update(kind, |health| {
			f(health);

			after = health.status;
			failures = health.consecutive_failures;
		});

		if before == after {
			return;
		}

		match after {
			HealthStatus::Healthy => tracing::info!(
				backend = %kind,
				from = before.as_str(),
				"Backend recovered."
			),
			HealthStatus::Degraded | HealthStatus::Unavailable => tracing::warn!(
				backend = %kind,
				from = before.as_str(),
				to = after.as_str(),
				consecutive_failures = failures,
				detail = detail.as_deref().unwrap_or(""),
				"Backend health changed."
			),
		}
	}
}

/// Builds the tracker with its read view and the reporter the dispatcher sends outcomes to.
pub fn health_channel(
	adapters: Vec<Arc<dyn BackendAdapter>>,
	cfg: &mnemo_config::Health,
) -> (HealthTracker, HealthView, HealthReporter) {
	let (tx, rx) = mpsc::unbounded_channel();
	let view = HealthView::new();
	let tracker = HealthTracker {
		adapters,
		view: view.clone(),
		outcomes: rx,
		cfg: cfg.clone(),
		open_until: BTreeMap::new(),
	};

	(tracker, view, HealthReporter { tx })
}
