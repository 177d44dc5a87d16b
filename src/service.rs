//! The RAG Pipeline (§4.7): the top-level orchestrator wiring the query
//! enhancer, hybrid searcher, multi-stage retriever, contextual ranker,
//! response cache and feedback collector into a single `process_query`
//! entry point.
//!
//! Grounded on the teacher's `service.rs` `RetrievalService` — feature-gated
//! constructors, a `search_with_limit`-shaped public entry point, and a
//! background-cached collaborator (there: `INSTANCES: Lazy<BlockingLruCache<...>>`;
//! here: the periodic cache sweeper spawned in [`RagPipeline::new`]) —
//! generalized from "BM25 + optional vector search over a local store" to
//! the full enhance → retrieve → rank → cache pipeline in spec.md §4.7.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use lru::LruCache;
use uuid::Uuid;

use crate::cache::CacheEntryKind;
use crate::cache::CacheStats;
use crate::cache::ClearScope;
use crate::cache::ResponseCache;
use crate::config::RetrievalConfig;
use crate::embeddings::EmbeddingProvider;
use crate::embeddings::NoopEmbeddingProvider;
use crate::error::CoreError;
use crate::error::Result;
use crate::feedback::FeedbackSink;
use crate::feedback::InMemoryFeedbackSink;
use crate::gateway::SearchGateway;
use crate::gateway::types::RunIndexerOutcome;
use crate::metrics::MetricsSnapshot;
use crate::metrics::PipelineMetrics;
use crate::ranking::AdaptiveRanker;
use crate::ranking::rank;
use crate::retriever::MultiStageRetriever;
use crate::retriever::RetrieveInput;
use crate::search::HybridSearchInput;
use crate::search::HybridSearcher;
use crate::search::HybridWeights;
use crate::types::Fingerprint;
use crate::types::Intent;
use crate::types::IndexerStatus;
use crate::types::Query;
use crate::types::QueryContext;
use crate::types::RankingFactors;
use crate::types::SearchResult;
use crate::types::StageKind;
use crate::types::FeedbackEvent;

/// Diagnostic metadata attached to every [`PipelineResponse`] (§4.7 step 7).
#[derive(Debug, Clone, Default)]
pub struct PipelineMetadata {
    /// Assigned per request; callers echo this back in [`FeedbackEvent::query_id`]
    /// so the adaptive ranker can find the ranking factors that were in
    /// play when a clicked/copied result was shown.
    pub query_id: String,
    pub intent: Option<Intent>,
    pub variants_used: Vec<String>,
    pub total_candidates: usize,
    pub stages_used: Vec<StageKind>,
    pub processing_time_ms: u64,
    pub context_used: bool,
    pub cache_hit: bool,
    pub vector_used: bool,
}

/// Result of [`RagPipeline::process_query`]. Always returned — this type
/// never corresponds to a raised exception (§7 "User-visible failure
/// behavior").
#[derive(Debug, Clone)]
pub struct PipelineResponse {
    pub success: bool,
    pub results: Vec<SearchResult>,
    /// Generated natural-language answer. Synthesis itself is out of scope
    /// for this core (§4.7 step 6); always `None` here.
    pub response: Option<String>,
    pub metadata: PipelineMetadata,
    pub error: Option<String>,
}

impl PipelineResponse {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            response: None,
            metadata: PipelineMetadata::default(),
            error: Some(error.into()),
        }
    }

    fn empty_success(query_id: String) -> Self {
        Self {
            success: true,
            results: Vec::new(),
            response: None,
            metadata: PipelineMetadata { query_id, ..Default::default() },
            error: None,
        }
    }
}

/// Seam for response synthesis (§4.7 step 6). Out of scope for this core
/// — no implementation ships here — but the trait is defined so a
/// surrounding transport layer can attach one via [`RagPipeline::with_generator`].
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, query: &Query, results: &[SearchResult]) -> Result<String>;
}

const RECENT_FACTORS_CAPACITY: usize = 4_096;

/// The top-level retrieval orchestrator. Owns every collaborator's
/// lifetime: gateway, searcher, retriever, ranker, cache and feedback sink
/// are all created once in [`RagPipeline::new`] and live exactly as long
/// as this struct (§3 "Ownership").
pub struct RagPipeline {
    config: RetrievalConfig,
    gateway: Option<Arc<SearchGateway>>,
    searcher: Arc<HybridSearcher>,
    retriever: MultiStageRetriever,
    adaptive_ranker: Arc<AdaptiveRanker>,
    cache: Arc<ResponseCache<PipelineResponse>>,
    feedback: Arc<dyn FeedbackSink>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    generator: Option<Arc<dyn ResponseGenerator>>,
    metrics: Arc<PipelineMetrics>,
    /// (query_id, result_id) -> (intent, factors) at ranking time, so a
    /// later `record_feedback` call can feed the adaptive ranker without
    /// the caller having to round-trip the full factor vector.
    recent_factors: StdMutex<LruCache<(String, String), (Intent, RankingFactors)>>,
    sweeper: Option<tokio::task::JoinHandle<()>>,
}

impl Drop for RagPipeline {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

impl RagPipeline {
    /// Build a pipeline from already-loaded configuration. No embedding
    /// provider is attached — the hybrid searcher's vector stage is
    /// always skipped (§4.2 step 2) until [`Self::with_embeddings`].
    pub fn new(config: RetrievalConfig) -> Self {
        Self::build(config, Arc::new(NoopEmbeddingProvider), Arc::new(InMemoryFeedbackSink::new()))
    }

    /// Build a pipeline from `INDEX_ENDPOINT`/`INDEX_API_KEY`/`INDEX_NAME`
    /// and friends, failing fast per §6 if required configuration is
    /// missing or malformed.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(RetrievalConfig::from_env()?))
    }

    pub fn with_embeddings(config: RetrievalConfig, embedding_provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::build(config, embedding_provider, Arc::new(InMemoryFeedbackSink::new()))
    }

    pub fn with_feedback_sink(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = sink;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn ResponseGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    fn build(
        config: RetrievalConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        feedback: Arc<dyn FeedbackSink>,
    ) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        let gateway = Arc::new(SearchGateway::new(config.backend.clone()));
        let searcher = Arc::new(HybridSearcher::new(
            Arc::clone(&gateway),
            config.search,
            &config.backend,
            Arc::clone(&metrics),
        ));
        let retriever = MultiStageRetriever::new(Arc::clone(&searcher));
        let adaptive_ranker = Arc::new(AdaptiveRanker::new(config.adaptive_ranking));
        let cache = Arc::new(ResponseCache::new(config.cache.max_entries, config.cache.ttl(), Arc::clone(&metrics)));

        let sweeper = {
            let cache = Arc::clone(&cache);
            let interval = (config.cache.ttl() / 2).max(Duration::from_secs(1));
            Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    let evicted = cache.sweep_expired();
                    if evicted > 0 {
                        tracing::debug!(evicted, "response cache sweeper evicted expired entries");
                    }
                }
            }))
        };

        Self {
            config,
            gateway: Some(gateway),
            searcher,
            retriever,
            adaptive_ranker,
            cache,
            feedback,
            embedding_provider,
            generator: None,
            metrics,
            recent_factors: StdMutex::new(LruCache::new(
                std::num::NonZeroUsize::new(RECENT_FACTORS_CAPACITY).expect("capacity > 0"),
            )),
            sweeper,
        }
    }

    /// Construct a pipeline with no gateway at all — the "uninitialized"
    /// case (§4.2 step 6): every search fast-fails with an empty result
    /// rather than attempting network work. Useful for tests and for a
    /// caller that wants to exercise the ranker/cache in isolation.
    pub fn without_gateway(config: RetrievalConfig) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        let searcher = Arc::new(HybridSearcher::without_gateway(config.search, Arc::clone(&metrics)));
        let retriever = MultiStageRetriever::new(Arc::clone(&searcher));
        let adaptive_ranker = Arc::new(AdaptiveRanker::new(config.adaptive_ranking));
        let cache = Arc::new(ResponseCache::new(config.cache.max_entries, config.cache.ttl(), Arc::clone(&metrics)));
        Self {
            config,
            gateway: None,
            searcher,
            retriever,
            adaptive_ranker,
            cache,
            feedback: Arc::new(InMemoryFeedbackSink::new()),
            embedding_provider: Arc::new(NoopEmbeddingProvider),
            generator: None,
            metrics,
            recent_factors: StdMutex::new(LruCache::new(
                std::num::NonZeroUsize::new(RECENT_FACTORS_CAPACITY).expect("capacity > 0"),
            )),
            sweeper: None,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Public entry point (§4.7, §6 `processQuery`). Never raises: every
    /// failure path returns `PipelineResponse { success: false, .. }`.
    pub async fn process_query(&self, query: Query, context: QueryContext, generate_response: bool) -> PipelineResponse {
        if let Err(e) = query.validate() {
            return PipelineResponse::failure(e.to_string());
        }
        if query.max_results == 0 {
            return PipelineResponse::empty_success(Uuid::new_v4().to_string());
        }

        let fingerprint = Fingerprint::compute(&query);
        let tags = fingerprint_tags(&query);

        if query.disable_cache {
            return match self.compute(&query, &context, generate_response).await {
                Ok(response) => response,
                Err(e) => PipelineResponse::failure(e.to_string()),
            };
        }

        let query_for_compute = query.clone();
        let context_for_compute = context.clone();
        let result = self
            .cache
            .get_or_compute(fingerprint, CacheEntryKind::Results, tags, || async move {
                self.compute(&query_for_compute, &context_for_compute, generate_response).await
            })
            .await;

        match result {
            Ok((response, was_cache_hit)) => {
                let mut response = (*response).clone();
                response.metadata.cache_hit = was_cache_hit;
                response
            }
            Err(e) => PipelineResponse::failure(e.to_string()),
        }
    }

    async fn compute(&self, query: &Query, context: &QueryContext, generate_response: bool) -> Result<PipelineResponse> {
        let start = Instant::now();
        let query_id = Uuid::new_v4().to_string();

        let weights = HybridWeights::new(0.5, 0.3, self.config.search.default_exact_weight)?;
        let embedding = if weights.vector > 0.0 {
            match self.embedding_provider.embed(&query.text).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    tracing::debug!(error = %e, "embedding unavailable, vector stage will be skipped");
                    None
                }
            }
        } else {
            None
        };

        let top_k = query.max_results.max(1) as usize;
        let outcome = self
            .retriever
            .retrieve(RetrieveInput {
                query_text: query.text.clone(),
                intent_hint: query.intent_hint,
                language: query.language.clone(),
                repository: query.repository.clone(),
                caller_filter: None,
                exact_terms_override: query.exact_terms.clone(),
                top_k_per_variant: top_k,
                hybrid_weights: weights,
                embedding,
                deadline: Duration::from_millis(self.config.pipeline.deadline_ms),
            })
            .await;

        if outcome.stages_used.is_empty() && outcome.results.is_empty() {
            return Err(CoreError::BackendTransientError {
                status: 503,
                method: "SEARCH".to_string(),
                path: format!("/indexes/{}/docs/search", self.config.backend.index_name),
                attempt: 1,
            });
        }

        let context_used = context.current_file.is_some() || context.workspace_root.is_some();
        let total_candidates = outcome.results.len();
        let now_unix = chrono::Utc::now().timestamp();
        let weight_table = self.adaptive_ranker.weights_for(outcome.enhanced.intent);

        let mut ranked = rank(outcome.results, &weight_table, &query.text, context, now_unix, &self.metrics);
        ranked.truncate(top_k);

        {
            let mut recent = self
                .recent_factors
                .lock()
                .map_err(|_| CoreError::internal("recent-factors mutex poisoned"))?;
            for result in &ranked {
                if let Some(factors) = result.ranking_factors {
                    recent.put((query_id.clone(), result.id.clone()), (outcome.enhanced.intent, factors));
                }
            }
        }

        let response_text = if generate_response {
            match &self.generator {
                Some(generator) => Some(generator.generate(query, &ranked).await?),
                None => None,
            }
        } else {
            None
        };

        Ok(PipelineResponse {
            success: true,
            results: ranked,
            response: response_text,
            metadata: PipelineMetadata {
                query_id,
                intent: Some(outcome.enhanced.intent),
                variants_used: outcome.variants_used,
                total_candidates,
                stages_used: outcome.stages_used,
                processing_time_ms: start.elapsed().as_millis() as u64,
                context_used,
                cache_hit: false,
                vector_used: outcome.vector_used,
            },
            error: None,
        })
    }

    /// `searchHybrid` (§6): run the hybrid searcher directly, bypassing
    /// enhancement, variant fan-out and ranking.
    pub async fn search_hybrid(
        &self,
        query_text: &str,
        filter: Option<String>,
        top_k: usize,
        weights: HybridWeights,
        embedding: Option<Vec<f32>>,
    ) -> Result<Vec<SearchResult>> {
        let outcome = self
            .searcher
            .search(&HybridSearchInput {
                query_text: query_text.to_string(),
                language: None,
                repository: None,
                caller_filter: filter,
                exact_terms: Vec::new(),
                top_k,
                weights,
                embedding,
            })
            .await?;
        Ok(outcome.results)
    }

    /// `runIndexer` (§6).
    pub async fn run_indexer(
        &self,
        name: &str,
        wait: bool,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<RunIndexerOutcome> {
        let gateway = self.gateway.as_ref().ok_or_else(|| CoreError::internal("gateway not configured"))?;
        gateway.run_indexer(name, wait, poll_interval, timeout).await
    }

    /// `getIndexerStatus` (§6).
    pub async fn get_indexer_status(&self, name: &str) -> Result<IndexerStatus> {
        let gateway = self.gateway.as_ref().ok_or_else(|| CoreError::internal("gateway not configured"))?;
        gateway.get_indexer_status(name).await
    }

    /// `cacheStats` (§6).
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// `cacheClear` (§6).
    pub fn cache_clear(&self, scope: ClearScope, pattern: Option<&str>) {
        self.cache.clear(scope, pattern);
    }

    /// `recordFeedback` (§6). Feeds the adaptive ranker from the ranking
    /// factors recorded at ranking time for `(event.query_id, event.result_id)`,
    /// when still resident in the bounded recent-factors cache.
    pub async fn record_feedback(&self, event: FeedbackEvent) -> Result<()> {
        let factors = {
            let mut recent = self
                .recent_factors
                .lock()
                .map_err(|_| CoreError::internal("recent-factors mutex poisoned"))?;
            recent.get(&(event.query_id.clone(), event.result_id.clone())).copied()
        };

        if let Some((_, factors)) = factors {
            self.adaptive_ranker.observe(&event, &factors, &self.metrics);
        }

        self.feedback.record(event).await
    }

    /// Read back recorded feedback since `since` (unix seconds). Used by
    /// offline analytics (§4.8).
    pub async fn feedback_window(&self, since: i64) -> Result<Vec<FeedbackEvent>> {
        self.feedback.window(since).await
    }
}

/// Tags attached to a cache entry for `cacheClear(scope, pattern)` pattern
/// matching (§4.6).
fn fingerprint_tags(query: &Query) -> Vec<String> {
    let mut tags = Vec::new();
    if let Some(language) = &query.language {
        tags.push(format!("lang:{language}"));
    }
    if let Some(repository) = &query.repository {
        tags.push(format!("repo:{repository}"));
    }
    if let Some(intent) = query.intent_hint {
        tags.push(format!("intent:{intent}"));
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RetrievalConfig {
        RetrievalConfig {
            backend: crate::config::BackendConfig {
                endpoint: "https://example.search.windows.net".into(),
                api_key: "test-key".into(),
                index_name: "code-index".into(),
                rest_timeout_seconds: 30,
                indexer_timeout_seconds: 300,
                indexer_poll_interval_seconds: 2,
                semantic_config_name: "semantic-config".into(),
                connection_pool_size: 32,
            },
            cache: crate::config::CacheConfig::default(),
            search: crate::config::SearchConfig::default(),
            pipeline: crate::config::PipelineConfig::default(),
            adaptive_ranking: crate::config::AdaptiveRankingConfig::default(),
            log_level: "info".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_query_text_returns_validation_failure() {
        let pipeline = RagPipeline::without_gateway(test_config());
        let response = pipeline.process_query(Query::new("   "), QueryContext::default(), false).await;
        assert!(!response.success);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn max_results_zero_returns_empty_success() {
        let pipeline = RagPipeline::without_gateway(test_config());
        let mut query = Query::new("find the bug");
        query.max_results = 0;
        let response = pipeline.process_query(query, QueryContext::default(), false).await;
        assert!(response.success);
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn without_gateway_all_stages_fail_and_surfaces_as_backend_error() {
        let pipeline = RagPipeline::without_gateway(test_config());
        let response = pipeline
            .process_query(Query::new("implement a cache"), QueryContext::default(), false)
            .await;
        assert!(!response.success);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn cache_clear_and_stats_do_not_panic_with_an_empty_cache() {
        let pipeline = RagPipeline::without_gateway(test_config());
        let stats = pipeline.cache_stats();
        assert_eq!(stats.entries, 0);
        pipeline.cache_clear(ClearScope::All, None);
    }

    #[tokio::test]
    async fn record_feedback_without_prior_ranking_still_appends_to_the_sink() {
        let pipeline = RagPipeline::without_gateway(test_config());
        let event = FeedbackEvent {
            kind: crate::types::FeedbackKind::Click,
            query_id: "unknown-query".to_string(),
            result_id: "unknown-result".to_string(),
            position: 0,
            dwell_ms: None,
            timestamp: 0,
            intent: Intent::Debug,
        };
        pipeline.record_feedback(event).await.unwrap();
        assert_eq!(pipeline.feedback_window(0).await.unwrap().len(), 1);
    }
}
