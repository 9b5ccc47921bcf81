mod policy;
mod shadow;

pub use policy::{
	ResolvedPolicy, build_policy_snapshot, hash_policy_snapshot, resolve_policy,
	resolve_shadow_policy,
};
pub use shadow::{ShadowReport, shadow_report};

use std::{
	cmp::Ordering,
	collections::{BTreeMap, btree_map::Entry},
};

use time::OffsetDateTime;

use mnemo_domain::{item::ItemContent, query::BackendKind, result::SearchResult};

use crate::adapter::BackendHit;

const SECONDS_PER_DAY: f32 = 86_400.0;
const CODE_CONTENT_TYPE: &str = "code";

/// One distinct id with every per-backend score that mentioned it.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
	pub id: String,
	pub content: ItemContent,
	pub updated_at: Option<OffsetDateTime>,
	pub scores: BTreeMap<BackendKind, f32>,
}
impl Candidate {
	/// Backend with the highest score for this id, first in canonical order on ties.
	pub fn best_source(&self) -> BackendKind {
		let mut best: Option<(BackendKind, f32)> = None;

		for (kind, score) in &self.scores {
			if best.is_none_or(|(_, top)| *score > top) {
				best = Some((*kind, *score));
			}
		}

		best.map(|(kind, _)| kind).unwrap_or(BackendKind::Vector)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankedItem {
	pub id: String,
	pub content: ItemContent,
	/// Clamped to `[0, 1]`.
	pub score: f32,
	/// Combined score before clamping, used for ordering.
	pub raw_score: f32,
	pub source: BackendKind,
	pub updated_at: Option<OffsetDateTime>,
}
impl RankedItem {
	pub fn into_result(self) -> SearchResult {
		SearchResult { id: self.id, content: self.content, score: self.score, source: self.source }
	}
}

/// Collapses hits by id. Every contributing backend score is kept; within one backend the
/// highest score wins. Content comes from the highest-scoring hit.
pub fn merge_hits<I>(hits: I) -> Vec<Candidate>
where
	I: IntoIterator<Item = (BackendKind, BackendHit)>,
{
	let mut merged: BTreeMap<String, (Candidate, f32)> = BTreeMap::new();

	for (kind, hit) in hits {
		match merged.entry(hit.id.clone()) {
			Entry::Vacant(slot) => {
				let score = hit.score;

				slot.insert((
					Candidate {
						id: hit.id,
						content: hit.content,
						updated_at: hit.updated_at,
						scores: BTreeMap::from([(kind, score)]),
					},
					score,
				));
			},
			Entry::Occupied(mut slot) => {
				let (candidate, best) = slot.get_mut();
				let score = candidate.scores.entry(kind).or_insert(hit.score);

				*score = score.max(hit.score);

				if hit.score > *best {
					*best = hit.score;
					candidate.content = hit.content;
				}

				candidate.updated_at = match (candidate.updated_at, hit.updated_at) {
					(Some(a), Some(b)) => Some(a.max(b)),
					(a, b) => a.or(b),
				};
			},
		}
	}

	merged.into_values().map(|(candidate, _)| candidate).collect()
}

/// `Σ weight_b × score_b`, with the vector score decayed by `e^(-Δdays/τ)` under a recency
/// policy and the total multiplied by the code boost for code content.
pub fn combined_score(policy: &ResolvedPolicy, candidate: &Candidate, now: OffsetDateTime) -> f32 {
	let mut total = 0.0;

	for (kind, score) in &candidate.scores {
		let mut score = *score;

		if *kind == BackendKind::Vector
			&& let (Some(tau), Some(updated_at)) = (policy.recency_tau_days, candidate.updated_at)
		{
			score *= recency_decay(now - updated_at, tau);
		}

		total += policy.weight(*kind) * score;
	}

	if candidate.content.content_type.eq_ignore_ascii_case(CODE_CONTENT_TYPE) {
		total *= policy.code_boost;
	}

	total
}

pub fn recency_decay(age: time::Duration, tau_days: f32) -> f32 {
	if tau_days <= 0.0 {
		return 1.0;
	}

	let age_days = (age.as_seconds_f32() / SECONDS_PER_DAY).max(0.0);

	(-age_days / tau_days).exp()
}

/// Orders candidates by combined score, then most recent update, then ascending id, and
/// keeps the first `limit`.
pub fn rank(
	policy: &ResolvedPolicy,
	candidates: &[Candidate],
	limit: usize,
	now: OffsetDateTime,
) -> Vec<RankedItem> {
	let mut ranked = candidates
		.iter()
		.map(|candidate| {
			let raw_score = combined_score(policy, candidate, now);

			RankedItem {
				id: candidate.id.clone(),
				content: candidate.content.clone(),
				score: clamp_score(raw_score),
				raw_score,
				source: candidate.best_source(),
				updated_at: candidate.updated_at,
			}
		})
		.collect::<Vec<_>>();

	ranked.sort_by(cmp_ranked);
	ranked.truncate(limit);

	ranked
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

fn cmp_ranked(a: &RankedItem, b: &RankedItem) -> Ordering {
	cmp_f32_desc(a.raw_score, b.raw_score)
		.then_with(|| match (a.updated_at, b.updated_at) {
			(Some(a), Some(b)) => b.cmp(&a),
			(Some(_), None) => Ordering::Less,
			(None, Some(_)) => Ordering::Greater,
			(None, None) => Ordering::Equal,
		})
		.then_with(|| a.id.cmp(&b.id))
}

fn clamp_score(score: f32) -> f32 {
	if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	fn hit(id: &str, score: f32) -> BackendHit {
		BackendHit { id: id.to_string(), score, content: ItemContent::default(), updated_at: None }
	}

	fn policy(vector: f32, graph: f32, kv: f32) -> ResolvedPolicy {
		ResolvedPolicy {
			name: "test".to_string(),
			vector_weight: vector,
			graph_weight: graph,
			kv_weight: kv,
			code_boost: 1.0,
			recency_tau_days: None,
		}
	}

	#[test]
	fn blended_score_is_weighted_sum() {
		let candidates = merge_hits([
			(BackendKind::Vector, hit("a", 0.9)),
			(BackendKind::Graph, hit("a", 0.5)),
		]);
		let score = combined_score(&policy(0.7, 0.3, 0.3), &candidates[0], OffsetDateTime::UNIX_EPOCH);

		assert_eq!(candidates.len(), 1);
		assert!((score - 0.78).abs() < 1e-6, "score = {score}");
	}

	#[test]
	fn missing_backends_contribute_nothing() {
		let candidates = merge_hits([(BackendKind::Graph, hit("a", 0.5))]);

		assert_eq!(
			combined_score(&policy(1.0, 0.0, 0.0), &candidates[0], OffsetDateTime::UNIX_EPOCH),
			0.0
		);
	}

	#[test]
	fn ties_break_on_recency_then_id() {
		let now = datetime!(2026-06-01 0:00 UTC);
		let mut newer = hit("b", 0.5);

		newer.updated_at = Some(datetime!(2026-05-01 0:00 UTC));

		let candidates = merge_hits([
			(BackendKind::Vector, hit("c", 0.5)),
			(BackendKind::Vector, hit("a", 0.5)),
			(BackendKind::Vector, newer),
		]);
		let ranked = rank(&policy(1.0, 0.0, 0.0), &candidates, 10, now);
		let ids = ranked.iter().map(|item| item.id.as_str()).collect::<Vec<_>>();

		assert_eq!(ids, vec!["b", "a", "c"]);
	}

	#[test]
	fn scores_are_clamped_but_order_uses_raw_sum() {
		let candidates = merge_hits([
			(BackendKind::Vector, hit("a", 1.0)),
			(BackendKind::Kv, hit("a", 1.0)),
			(BackendKind::Vector, hit("b", 1.0)),
		]);
		let ranked = rank(&policy(1.0, 0.0, 0.5), &candidates, 10, OffsetDateTime::UNIX_EPOCH);

		assert_eq!(ranked[0].id, "a");
		assert_eq!(ranked[0].score, 1.0);
		assert_eq!(ranked[0].raw_score, 1.5);
		assert_eq!(ranked[1].score, 1.0);
	}

	#[test]
	fn code_boost_and_recency_shape_scores() {
		let now = datetime!(2026-06-01 0:00 UTC);
		let mut code = hit("code", 0.5);

		code.content.content_type = "code".to_string();

		let mut old = hit("old", 0.8);

		old.updated_at = Some(datetime!(2026-05-02 0:00 UTC));

		let candidates = merge_hits([(BackendKind::Vector, code), (BackendKind::Vector, old)]);
		let mut boosted = policy(1.0, 0.0, 0.0);

		boosted.code_boost = 1.5;
		boosted.recency_tau_days = Some(30.0);

		let code_score = combined_score(&boosted, &candidates[0], now);
		let old_score = combined_score(&boosted, &candidates[1], now);

		assert!((code_score - 0.75).abs() < 1e-6);
		assert!((old_score - 0.8 * (-1.0_f32).exp()).abs() < 1e-4);
	}

	#[test]
	fn merge_keeps_highest_source_and_limit_truncates() {
		let candidates = merge_hits([
			(BackendKind::Vector, hit("a", 0.4)),
			(BackendKind::Kv, hit("a", 1.0)),
			(BackendKind::Vector, hit("b", 0.3)),
		]);
		let ranked = rank(&policy(1.0, 0.0, 0.0), &candidates, 1, OffsetDateTime::UNIX_EPOCH);

		assert_eq!(candidates[0].best_source(), BackendKind::Kv);
		assert_eq!(candidates[0].scores.len(), 2);
		assert_eq!(ranked.len(), 1);
		assert_eq!(ranked[0].id, "a");
	}
}
