use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
	Vector,
	Graph,
	Kv,
}
impl BackendKind {
	/// Canonical order, used wherever backends are listed.
	pub const ALL: [BackendKind; 3] = [BackendKind::Vector, BackendKind::Graph, BackendKind::Kv];

	pub fn as_str(self) -> &'static str {
		match self {
			BackendKind::Vector => "vector",
			BackendKind::Graph => "graph",
			BackendKind::Kv => "kv",
		}
	}
}
impl fmt::Display for BackendKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
	Vector,
	Graph,
	Kv,
	#[default]
	Hybrid,
	Auto,
}
impl SearchMode {
	pub fn as_str(self) -> &'static str {
		match self {
			SearchMode::Vector => "vector",
			SearchMode::Graph => "graph",
			SearchMode::Kv => "kv",
			SearchMode::Hybrid => "hybrid",
			SearchMode::Auto => "auto",
		}
	}

	/// Backends the caller asked for, before health filtering.
	pub fn requested_backends(self) -> Vec<BackendKind> {
		match self {
			SearchMode::Vector => vec![BackendKind::Vector],
			SearchMode::Graph => vec![BackendKind::Graph],
			SearchMode::Kv => vec![BackendKind::Kv],
			SearchMode::Hybrid | SearchMode::Auto => BackendKind::ALL.to_vec(),
		}
	}

	pub fn is_explicit(self) -> bool {
		!matches!(self, SearchMode::Hybrid | SearchMode::Auto)
	}
}
impl FromStr for SearchMode {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"vector" => Ok(SearchMode::Vector),
			"graph" => Ok(SearchMode::Graph),
			"kv" => Ok(SearchMode::Kv),
			"hybrid" => Ok(SearchMode::Hybrid),
			"auto" => Ok(SearchMode::Auto),
			other => Err(format!("Unknown search_mode {other:?}.")),
		}
	}
}

/// Joins backend names with `+` in canonical order, e.g. `vector+graph`.
pub fn mode_label(backends: &[BackendKind]) -> String {
	let mut sorted = backends.to_vec();

	sorted.sort();
	sorted.dedup();

	sorted.iter().map(|kind| kind.as_str()).collect::<Vec<_>>().join("+")
}
