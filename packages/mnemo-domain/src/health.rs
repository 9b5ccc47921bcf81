use serde::Serialize;
use time::OffsetDateTime;

use crate::query::BackendKind;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
	Healthy,
	Degraded,
	Unavailable,
}
impl HealthStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			HealthStatus::Healthy => "healthy",
			HealthStatus::Degraded => "degraded",
			HealthStatus::Unavailable => "unavailable",
		}
	}

	pub fn is_routable(self) -> bool {
		!matches!(self, HealthStatus::Unavailable)
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct BackendHealth {
	pub backend: BackendKind,
	pub status: HealthStatus,
	pub latency_ms: Option<u64>,
	#[serde(with = "crate::time_serde::option")]
	pub last_checked: Option<OffsetDateTime>,
	pub consecutive_failures: u32,
}
impl BackendHealth {
	/// Optimistic initial state; the first probe corrects it.
	pub fn initial(backend: BackendKind) -> Self {
		Self {
			backend,
			status: HealthStatus::Healthy,
			latency_ms: None,
			last_checked: None,
			consecutive_failures: 0,
		}
	}
}
