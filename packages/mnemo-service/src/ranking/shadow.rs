use std::collections::HashSet;

use serde::Serialize;

use crate::ranking::RankedItem;

/// Comparison of the served ranking against a shadow policy over the same candidates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShadowReport {
	pub active_policy: String,
	pub shadow_policy: String,
	pub k: usize,
	pub active_top: Vec<String>,
	pub shadow_top: Vec<String>,
	/// Share of the active top-k ids that also appear in the shadow top-k.
	pub overlap_at_k: f32,
	/// Share of top-k positions whose id differs between the two rankings.
	pub churn_at_k: f32,
}

pub fn shadow_report(
	active_policy: &str,
	shadow_policy: &str,
	active: &[RankedItem],
	shadow: &[RankedItem],
) -> ShadowReport {
	let k = active.len().max(shadow.len());
	let active_top = active.iter().map(|item| item.id.clone()).collect::<Vec<_>>();
	let shadow_top = shadow.iter().map(|item| item.id.clone()).collect::<Vec<_>>();
	let (overlap_at_k, churn_at_k) = if k == 0 {
		(1.0, 0.0)
	} else {
		let shadow_ids = shadow_top.iter().collect::<HashSet<_>>();
		let overlap = active_top.iter().filter(|id| shadow_ids.contains(id)).count();
		let moved = (0..k).filter(|idx| active_top.get(*idx) != shadow_top.get(*idx)).count();

		(overlap as f32 / k as f32, moved as f32 / k as f32)
	};

	ShadowReport {
		active_policy: active_policy.to_string(),
		shadow_policy: shadow_policy.to_string(),
		k,
		active_top,
		shadow_top,
		overlap_at_k,
		churn_at_k,
	}
}

#[cfg(test)]
mod tests {
	use mnemo_domain::{item::ItemContent, query::BackendKind};

	use super::*;

	fn item(id: &str) -> RankedItem {
		RankedItem {
			id: id.to_string(),
			content: ItemContent::default(),
			score: 0.5,
			raw_score: 0.5,
			source: BackendKind::Vector,
			updated_at: None,
		}
	}

	fn items(ids: &[&str]) -> Vec<RankedItem> {
		ids.iter().map(|id| item(id)).collect()
	}

	#[test]
	fn identical_rankings_fully_overlap() {
		let ranked = items(&["a", "b", "c"]);
		let report = shadow_report("default", "lexical_boost", &ranked, &ranked);

		assert_eq!(report.k, 3);
		assert_eq!(report.overlap_at_k, 1.0);
		assert_eq!(report.churn_at_k, 0.0);
	}

	#[test]
	fn swapped_positions_churn_without_losing_overlap() {
		let report =
			shadow_report("default", "recency", &items(&["a", "b", "c", "d"]), &items(&["b", "a", "c", "e"]));

		assert_eq!(report.k, 4);
		assert!((report.overlap_at_k - 0.75).abs() < 1e-6);
		assert!((report.churn_at_k - 0.75).abs() < 1e-6);
		assert_eq!(report.active_top, vec!["a", "b", "c", "d"]);
		assert_eq!(report.shadow_top, vec!["b", "a", "c", "e"]);
	}

	#[test]
	fn shorter_shadow_counts_missing_positions_as_churn() {
		let report = shadow_report("default", "code_boost", &items(&["a", "b"]), &items(&["a"]));

		assert_eq!(report.k, 2);
		assert!((report.overlap_at_k - 0.5).abs() < 1e-6);
		assert!((report.churn_at_k - 0.5).abs() < 1e-6);
	}

	#[test]
	fn empty_rankings_report_no_churn() {
		let report = shadow_report("default", "recency", &[], &[]);

		assert_eq!(report.k, 0);
		assert_eq!(report.overlap_at_k, 1.0);
		assert_eq!(report.churn_at_k, 0.0);
	}
}
