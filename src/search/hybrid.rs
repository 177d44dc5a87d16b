//! The hybrid searcher (§4.2): runs semantic, vector and exact-match
//! stages against the gateway in parallel, normalizes their hits into a
//! common [`SearchResult`] shape, and fuses them with RRF.
//!
//! Grounded on the teacher's `search/hybrid.rs` stage-orchestration shape
//! (try each source, fall back gracefully when one is unavailable) and the
//! `cocode-rs` variant's `search/fusion.rs` RRF machinery, reused here
//! fed from three *gateway* stages instead of two in-process indexes.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::BackendConfig;
use crate::config::SearchConfig;
use crate::error::CoreError;
use crate::error::Result;
use crate::gateway::SearchGateway;
use crate::gateway::types::QueryType;
use crate::gateway::types::SearchRequest;
use crate::gateway::types::VectorQuery;
use crate::metrics::PipelineMetrics;
use crate::search::dedup::deduplicate_by_location;
use crate::search::fusion::RankedStage;
use crate::search::fusion::fuse;
use crate::types::ResultMetadata;
use crate::types::SearchResult;
use crate::types::StageKind;
use crate::types::clamp_chars;

const MAX_EXACT_TERM_LEN: usize = 200;
const HIGHLIGHT_FIELDS: &str = "content,function_name,class_name,docstring";

/// RRF stage weights. `w_sem + w_vec` must not exceed 1.0 (§4.2 input
/// contract); `w_exact` defaults to the caller-tunable-but-defaulted value
/// resolved in the Open Questions (§9): exposed, default 0.2.
#[derive(Debug, Clone, Copy)]
pub struct HybridWeights {
    pub semantic: f32,
    pub vector: f32,
    pub exact: f32,
}

impl HybridWeights {
    pub fn new(semantic: f32, vector: f32, exact: f32) -> Result<Self> {
        if semantic + vector > 1.0 {
            return Err(CoreError::validation("w_sem + w_vec must not exceed 1.0"));
        }
        Ok(Self { semantic, vector, exact })
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self { semantic: 0.5, vector: 0.3, exact: 0.2 }
    }
}

/// Input to a single hybrid search call.
#[derive(Debug, Clone)]
pub struct HybridSearchInput {
    pub query_text: String,
    pub language: Option<String>,
    pub repository: Option<String>,
    pub caller_filter: Option<String>,
    pub exact_terms: Vec<String>,
    pub top_k: usize,
    pub weights: HybridWeights,
    /// Precomputed query embedding. The hybrid searcher never computes
    /// one itself (§4.2 step 2: "do NOT send a zero vector").
    pub embedding: Option<Vec<f32>>,
}

/// Result of a hybrid search call, including the diagnostic fields the
/// pipeline needs for its metadata (§4.7 step 7).
#[derive(Debug, Clone)]
pub struct HybridSearchOutcome {
    pub results: Vec<SearchResult>,
    pub vector_used: bool,
    pub stages_used: Vec<StageKind>,
    /// True when every attempted stage failed.
    pub all_stages_failed: bool,
}

/// Runs the semantic/vector/exact stages against a [`SearchGateway`] and
/// fuses them with RRF.
pub struct HybridSearcher {
    gateway: Option<Arc<SearchGateway>>,
    config: SearchConfig,
    semantic_config_name: String,
    semaphore: Arc<Semaphore>,
    metrics: Arc<PipelineMetrics>,
}

impl HybridSearcher {
    pub fn new(
        gateway: Arc<SearchGateway>,
        search_config: SearchConfig,
        backend_config: &BackendConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(search_config.max_concurrent_stages));
        Self {
            gateway: Some(gateway),
            config: search_config,
            semantic_config_name: backend_config.semantic_config_name.clone(),
            semaphore,
            metrics,
        }
    }

    /// Construct a searcher with no backing gateway. Used to model "the
    /// gateway is uninitialized" (§4.2 step 6): every call returns an
    /// empty result set immediately without attempting network work.
    pub fn without_gateway(config: SearchConfig, metrics: Arc<PipelineMetrics>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_stages));
        Self {
            gateway: None,
            config,
            semantic_config_name: String::new(),
            semaphore,
            metrics,
        }
    }

    pub async fn search(&self, input: &HybridSearchInput) -> Result<HybridSearchOutcome> {
        let Some(gateway) = self.gateway.as_ref() else {
            return Ok(HybridSearchOutcome {
                results: Vec::new(),
                vector_used: false,
                stages_used: Vec::new(),
                all_stages_failed: true,
            });
        };

        let sanitized_terms = sanitize_exact_terms(&input.exact_terms);
        let exact_filter = build_exact_filter(&sanitized_terms);
        let combined_filter = combine_filters(input.caller_filter.as_deref(), exact_filter.as_deref());

        let top = (input.top_k * 2).max(1) as i32;

        let semantic_request = SearchRequest {
            search: input.query_text.clone(),
            query_type: QueryType::Semantic,
            semantic_configuration: Some(self.semantic_config_name.clone()),
            query_caption: Some("extractive".to_string()),
            query_answer: None,
            filter: combined_filter.clone(),
            top,
            skip: 0,
            order_by: None,
            select: None,
            highlight_fields: Some(HIGHLIGHT_FIELDS.to_string()),
            include_total_count: false,
            vector_queries: Vec::new(),
        };

        let vector_request = if input.weights.vector > 0.0 {
            input.embedding.clone().map(|embedding| SearchRequest {
                search: "*".to_string(),
                query_type: QueryType::Simple,
                semantic_configuration: None,
                query_caption: None,
                query_answer: None,
                filter: combined_filter.clone(),
                top,
                skip: 0,
                order_by: None,
                select: None,
                highlight_fields: None,
                include_total_count: false,
                vector_queries: vec![VectorQuery::new(embedding, top, "content_vector")],
            })
        } else {
            None
        };

        let exact_request = if !sanitized_terms.is_empty() {
            Some(SearchRequest {
                search: input.query_text.clone(),
                query_type: QueryType::Simple,
                semantic_configuration: None,
                query_caption: None,
                query_answer: None,
                filter: exact_filter.clone().or(combined_filter.clone()),
                top,
                skip: 0,
                order_by: None,
                select: None,
                highlight_fields: Some(HIGHLIGHT_FIELDS.to_string()),
                include_total_count: false,
                vector_queries: Vec::new(),
            })
        } else {
            None
        };

        let (semantic_results, vector_results, exact_results) = tokio::join!(
            self.run_stage(gateway, StageKind::Semantic, Some(semantic_request)),
            self.run_stage(gateway, StageKind::Vector, vector_request),
            self.run_stage(gateway, StageKind::Exact, exact_request),
        );

        let mut stages = Vec::new();
        let mut failures = 0usize;
        let mut attempted = 0usize;
        let mut owned_results: Vec<(StageKind, Vec<SearchResult>)> = Vec::new();

        for (kind, outcome) in [
            (StageKind::Semantic, semantic_results),
            (StageKind::Vector, vector_results),
            (StageKind::Exact, exact_results),
        ] {
            match outcome {
                Some(Ok(results)) => {
                    attempted += 1;
                    stages.push(kind);
                    owned_results.push((kind, results));
                }
                Some(Err(e)) => {
                    attempted += 1;
                    failures += 1;
                    self.metrics.record_stage_failure();
                    tracing::warn!(stage = %kind, error = %e, "hybrid search stage failed, continuing without it");
                }
                None => {}
            }
        }

        if attempted > 0 && failures == attempted {
            return Ok(HybridSearchOutcome {
                results: Vec::new(),
                vector_used: false,
                stages_used: Vec::new(),
                all_stages_failed: true,
            });
        }

        let mut ranked_stages: Vec<RankedStage<'_>> = Vec::new();
        for (kind, results) in &owned_results {
            let weight = match kind {
                StageKind::Semantic => input.weights.semantic,
                StageKind::Vector => input.weights.vector,
                StageKind::Exact => input.weights.exact,
            };
            ranked_stages.push(RankedStage { kind: *kind, weight, results });
        }

        let fused = fuse(&ranked_stages, self.config.rrf_k, input.top_k * 4);
        let deduped = deduplicate_by_location(fused);
        let mut results = deduped;
        results.truncate(input.top_k);

        let vector_used = stages.contains(&StageKind::Vector);

        Ok(HybridSearchOutcome {
            results,
            vector_used,
            stages_used: stages,
            all_stages_failed: false,
        })
    }

    async fn run_stage(
        &self,
        gateway: &SearchGateway,
        kind: StageKind,
        request: Option<SearchRequest>,
    ) -> Option<Result<Vec<SearchResult>>> {
        let request = request?;
        let _permit = self.semaphore.acquire().await.ok()?;
        let outcome = gateway.search(&request).await.map(|response| {
            response.value.into_iter().map(|doc| normalize_document(doc, kind)).collect()
        });
        Some(outcome)
    }
}

fn normalize_document(doc: crate::gateway::types::SearchDocument, stage: StageKind) -> SearchResult {
    let highlights = doc
        .highlights
        .into_iter()
        .map(|(field, fragments)| {
            let sanitized = fragments.iter().map(|f| SearchResult::sanitize_highlight(f)).collect();
            (field, sanitized)
        })
        .collect();

    SearchResult {
        id: doc.id,
        file_path: doc.file_path,
        repository: doc.repository,
        language: doc.language,
        code_snippet: doc.content,
        highlights,
        start_line: doc.start_line.unwrap_or(0),
        end_line: doc.end_line.unwrap_or(0),
        function_name: doc.function_name,
        class_name: doc.class_name,
        modified_time: doc.modified_time,
        raw_score: doc.search_score,
        ranked_score: 0.0,
        ranking_factors: None,
        explanation: None,
        metadata: ResultMetadata {
            exact_boost: stage == StageKind::Exact,
            vector_used: stage == StageKind::Vector,
            stages: vec![stage],
        },
    }
}

/// Clamp each term to 200 chars and drop non-printable ASCII (§4.2 step
/// 1). Terms that become empty after sanitation are dropped.
fn sanitize_exact_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| {
            let filtered: String = t.chars().filter(|c| c.is_ascii() && !c.is_ascii_control()).collect();
            clamp_chars(&filtered, MAX_EXACT_TERM_LEN)
        })
        .filter(|t| !t.trim().is_empty())
        .collect()
}

fn build_exact_filter(sanitized_terms: &[String]) -> Option<String> {
    if sanitized_terms.is_empty() {
        return None;
    }
    let clauses: Vec<String> = sanitized_terms
        .iter()
        .map(|term| {
            let escaped = term.replace('\'', "''");
            format!("search.ismatch('{escaped}', '{HIGHLIGHT_FIELDS}')")
        })
        .collect();
    Some(clauses.join(" or "))
}

fn combine_filters(caller_filter: Option<&str>, exact_filter: Option<&str>) -> Option<String> {
    match (caller_filter, exact_filter) {
        (Some(c), Some(e)) => Some(format!("({c}) and ({e})")),
        (Some(c), None) => Some(c.to_string()),
        (None, Some(e)) => Some(e.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_exact_terms_clamps_and_strips_control_chars() {
        let terms = vec![format!("{}\u{0007}", "x".repeat(250))];
        let sanitized = sanitize_exact_terms(&terms);
        assert_eq!(sanitized.len(), 1);
        assert!(sanitized[0].chars().count() <= MAX_EXACT_TERM_LEN);
        assert!(!sanitized[0].contains('\u{0007}'));
    }

    #[test]
    fn build_exact_filter_joins_with_or() {
        let filter = build_exact_filter(&["foo".to_string(), "bar".to_string()]).unwrap();
        assert!(filter.contains(" or "));
        assert!(filter.contains("search.ismatch('foo'"));
    }

    #[test]
    fn combine_filters_ands_both_when_present() {
        let combined = combine_filters(Some("language eq 'rust'"), Some("search.ismatch('x','f')"));
        assert_eq!(
            combined.unwrap(),
            "(language eq 'rust') and (search.ismatch('x','f'))"
        );
    }

    #[tokio::test]
    async fn search_without_gateway_returns_empty_and_flags_failure() {
        let searcher = HybridSearcher::without_gateway(SearchConfig::default(), Arc::new(PipelineMetrics::new()));
        let input = HybridSearchInput {
            query_text: "anything".to_string(),
            language: None,
            repository: None,
            caller_filter: None,
            exact_terms: Vec::new(),
            top_k: 5,
            weights: HybridWeights::default(),
            embedding: None,
        };
        let outcome = searcher.search(&input).await.unwrap();
        assert!(outcome.results.is_empty());
        assert!(outcome.all_stages_failed);
    }
}
