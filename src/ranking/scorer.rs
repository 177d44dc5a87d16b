//! Scoring, deterministic tie-breaking, and explanation text (§4.5).

use std::cmp::Ordering;

use crate::metrics::PipelineMetrics;
use crate::ranking::factors::coerce_non_finite;
use crate::ranking::factors::compute_factors;
use crate::ranking::weights::WeightTable;
use crate::types::QueryContext;
use crate::types::SearchResult;

/// Score and sort a batch of candidates in place for the given weight
/// table, attaching `ranking_factors`, `ranked_score` and `explanation` to
/// each. Returns the batch re-sorted by the tie-break rule (§4.5).
pub fn rank(
    mut candidates: Vec<SearchResult>,
    weights: &WeightTable,
    query_text: &str,
    context: &QueryContext,
    now_unix_seconds: i64,
    metrics: &PipelineMetrics,
) -> Vec<SearchResult> {
    let batch_raw_scores: Vec<f32> = candidates.iter().map(|c| c.raw_score).collect();

    for candidate in &mut candidates {
        let mut factors = compute_factors(candidate, &batch_raw_scores, query_text, context, now_unix_seconds);
        let coerced = coerce_non_finite(&mut factors);
        for _ in 0..coerced {
            metrics.record_nan_factor();
        }

        candidate.ranked_score = weights.score(&factors);
        candidate.explanation = Some(explain(weights, &factors));
        candidate.ranking_factors = Some(factors);
    }

    candidates.sort_by(|a, b| compare_candidates(a, b));
    candidates
}

/// The tie-break rule from §4.5: ranked score, then raw score, then
/// snippet length (longer first), then file path (alphabetical).
fn compare_candidates(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.ranked_score
        .partial_cmp(&a.ranked_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.raw_score.partial_cmp(&a.raw_score).unwrap_or(Ordering::Equal))
        .then_with(|| b.code_snippet.len().cmp(&a.code_snippet.len()))
        .then_with(|| a.file_path.cmp(&b.file_path))
}

const EXPLANATION_FACTORS: usize = 3;

/// Short human-readable rationale naming the top contributing factors.
fn explain(weights: &WeightTable, factors: &crate::types::RankingFactors) -> String {
    let weight_array = weights.as_array();
    let mut contributions: Vec<(&'static str, f32, f32)> = factors
        .as_pairs()
        .iter()
        .zip(weight_array.iter())
        .map(|((name, factor), weight)| (*name, factor.value, weight * factor.value))
        .collect();

    contributions.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));

    let parts: Vec<String> = contributions
        .into_iter()
        .take(EXPLANATION_FACTORS)
        .filter(|(_, _, contribution)| *contribution > 0.0)
        .map(|(name, value, _)| format!("{name}={value:.2}"))
        .collect();

    if parts.is_empty() {
        "no contributing factors".to_string()
    } else {
        format!("ranked on {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::weights::reference_table;
    use crate::types::Intent;
    use crate::types::ResultMetadata;

    fn candidate(id: &str, file_path: &str, raw_score: f32, snippet_len: usize) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            file_path: file_path.to_string(),
            repository: None,
            language: None,
            code_snippet: "x".repeat(snippet_len),
            highlights: Default::default(),
            start_line: 1,
            end_line: 2,
            function_name: None,
            class_name: None,
            modified_time: None,
            raw_score,
            ranked_score: 0.0,
            ranking_factors: None,
            explanation: None,
            metadata: ResultMetadata::default(),
        }
    }

    #[test]
    fn tie_break_prefers_higher_raw_score_then_longer_snippet_then_path() {
        let mut a = candidate("a", "b.rs", 0.5, 10);
        a.ranked_score = 1.0;
        let mut b = candidate("b", "a.rs", 0.9, 10);
        b.ranked_score = 1.0;
        assert_eq!(compare_candidates(&a, &b), Ordering::Greater);
    }

    #[test]
    fn rank_is_deterministic_across_repeated_invocations() {
        let weights = reference_table(Intent::Debug);
        let context = QueryContext::default();
        let metrics = PipelineMetrics::new();
        let candidates = vec![
            candidate("a", "a.rs", 0.5, 10),
            candidate("b", "b.rs", 0.9, 20),
            candidate("c", "c.rs", 0.9, 20),
        ];

        let ranked_once = rank(candidates.clone(), &weights, "fix the bug", &context, 0, &metrics);
        let ranked_twice = rank(candidates, &weights, "fix the bug", &context, 0, &metrics);

        let ids_once: Vec<&str> = ranked_once.iter().map(|r| r.id.as_str()).collect();
        let ids_twice: Vec<&str> = ranked_twice.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids_once, ids_twice);
    }

    #[test]
    fn every_candidate_gets_an_explanation() {
        let weights = reference_table(Intent::Implement);
        let context = QueryContext::default();
        let metrics = PipelineMetrics::new();
        let ranked = rank(vec![candidate("a", "a.rs", 0.5, 10)], &weights, "implement a cache", &context, 0, &metrics);
        assert!(ranked[0].explanation.is_some());
    }
}
