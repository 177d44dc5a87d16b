//! Reciprocal Rank Fusion (RRF).
//!
//! Grounded on the teacher's `search/fusion.rs` `RrfConfig`/`fuse_sources`
//! machinery (`score = Σ weight / (rank + k)`, `k` defaulting to 60):
//! reused near verbatim, but fed from gateway search stages (semantic,
//! vector, exact) instead of the teacher's local BM25/vector/snippet
//! indexes, and keyed by `SearchResult::id` rather than a chunk id.

use std::collections::HashMap;

use crate::types::SearchResult;
use crate::types::StageKind;

/// One ranked list participating in a fusion pass.
pub struct RankedStage<'a> {
    pub kind: StageKind,
    pub weight: f32,
    pub results: &'a [SearchResult],
}

/// Fuse any number of ranked stages with RRF, returning results sorted by
/// descending fused score and truncated to `limit`.
///
/// A result present only in the exact-match stage gets
/// `metadata.exact_boost = true` (§4.2 step 4); a result present in any
/// stage whose weight came from a caller-visible vector search gets
/// `metadata.vector_used = true`.
pub fn fuse(stages: &[RankedStage<'_>], k: f32, limit: usize) -> Vec<SearchResult> {
    let mut scores: HashMap<String, (f32, SearchResult)> = HashMap::new();

    for stage in stages {
        for (rank, result) in stage.results.iter().enumerate() {
            let contribution = stage.weight / (rank as f32 + k);
            scores
                .entry(result.id.clone())
                .and_modify(|(score, existing)| {
                    *score += contribution;
                    if stage.kind == StageKind::Exact {
                        existing.metadata.exact_boost = true;
                    }
                    if stage.kind == StageKind::Vector {
                        existing.metadata.vector_used = true;
                    }
                    if !existing.metadata.stages.contains(&stage.kind) {
                        existing.metadata.stages.push(stage.kind);
                    }
                })
                .or_insert_with(|| {
                    let mut merged = result.clone();
                    merged.metadata.exact_boost = stage.kind == StageKind::Exact;
                    merged.metadata.vector_used = stage.kind == StageKind::Vector;
                    merged.metadata.stages = vec![stage.kind];
                    (contribution, merged)
                });
        }
    }

    let mut fused: Vec<SearchResult> = scores
        .into_iter()
        .map(|(_, (rrf_score, mut result))| {
            result.raw_score = rrf_score;
            result
        })
        .collect();

    fused.sort_by(|a, b| b.raw_score.partial_cmp(&a.raw_score).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResultMetadata;

    fn result(id: &str) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            file_path: format!("{id}.rs"),
            repository: None,
            language: None,
            code_snippet: String::new(),
            highlights: Default::default(),
            start_line: 1,
            end_line: 2,
            function_name: None,
            class_name: None,
            modified_time: None,
            raw_score: 0.0,
            ranked_score: 0.0,
            ranking_factors: None,
            explanation: None,
            metadata: ResultMetadata::default(),
        }
    }

    #[test]
    fn single_stage_rrf_preserves_its_own_ordering() {
        let results = vec![result("a"), result("b"), result("c")];
        let stage = RankedStage {
            kind: StageKind::Semantic,
            weight: 1.0,
            results: &results,
        };
        let fused = fuse(&[stage], 60.0, 10);
        let order: Vec<&str> = fused.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn exact_stage_marks_exact_boost() {
        let exact = vec![result("a")];
        let semantic = vec![result("a"), result("b")];
        let fused = fuse(
            &[
                RankedStage { kind: StageKind::Semantic, weight: 0.8, results: &semantic },
                RankedStage { kind: StageKind::Exact, weight: 0.2, results: &exact },
            ],
            60.0,
            10,
        );
        let a = fused.iter().find(|r| r.id == "a").unwrap();
        assert!(a.metadata.exact_boost);
        let b = fused.iter().find(|r| r.id == "b").unwrap();
        assert!(!b.metadata.exact_boost);
    }

    #[test]
    fn fusion_truncates_to_limit() {
        let results: Vec<SearchResult> = (0..20).map(|i| result(&format!("r{i}"))).collect();
        let fused = fuse(
            &[RankedStage { kind: StageKind::Semantic, weight: 1.0, results: &results }],
            60.0,
            5,
        );
        assert_eq!(fused.len(), 5);
    }
}
