//! Retrieval core: a hybrid search and contextual ranking engine for a
//! code-aware RAG pipeline.
//!
//! ## Pipeline
//!
//! | Stage | Module | Description |
//! |-------|--------|-------------|
//! | Query enhancement | [`query`] | Intent classification, lexical variants, exact-term extraction |
//! | Multi-stage retrieval | [`retriever`] | Fans variants out to the hybrid searcher, fuses with RRF |
//! | Hybrid search | [`search`] | Semantic + vector + exact stages against the backend, RRF fusion |
//! | Contextual ranking | [`ranking`] | 8-factor scoring with adaptive, per-intent weights |
//! | Response cache | [`cache`] | Fingerprint-keyed, single-flight, TTL + LRU |
//! | Feedback | [`feedback`] | Append-only user-signal sink feeding the adaptive ranker |
//! | Gateway | [`gateway`] | REST client over the remote index service |
//!
//! [`RagPipeline`] wires all of the above into the single `process_query`
//! entry point (§4.7).
//!
//! ## Configuration
//!
//! Built once via [`RetrievalConfig::from_env`], which fails fast if
//! `INDEX_ENDPOINT`/`INDEX_API_KEY`/`INDEX_NAME` are missing.

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod feedback;
pub mod gateway;
pub mod metrics;
pub mod query;
pub mod ranking;
pub mod retriever;
pub mod search;
pub mod service;
pub mod types;

pub use cache::CacheEntryKind;
pub use cache::CacheStats;
pub use cache::ClearScope;
pub use cache::ResponseCache;
pub use config::RetrievalConfig;
pub use embeddings::EmbeddingProvider;
pub use embeddings::NoopEmbeddingProvider;
pub use error::CoreError;
pub use error::Result;
pub use feedback::FeedbackSink;
pub use feedback::InMemoryFeedbackSink;
pub use gateway::SearchGateway;
pub use gateway::types::RunIndexerOutcome;
pub use metrics::MetricsSnapshot;
pub use metrics::PipelineMetrics;
pub use query::QueryEnhancer;
pub use ranking::AdaptiveRanker;
pub use ranking::WeightTable;
pub use retriever::MultiStageRetriever;
pub use retriever::RetrieveInput;
pub use retriever::RetrieveOutcome;
pub use search::HybridSearchInput;
pub use search::HybridSearchOutcome;
pub use search::HybridSearcher;
pub use search::HybridWeights;
pub use service::PipelineMetadata;
pub use service::PipelineResponse;
pub use service::RagPipeline;
pub use service::ResponseGenerator;
pub use types::DetailLevel;
pub use types::EnhancedQuery;
pub use types::Factor;
pub use types::FactorSource;
pub use types::FeedbackEvent;
pub use types::FeedbackKind;
pub use types::Fingerprint;
pub use types::IndexerOverallStatus;
pub use types::IndexerRunResult;
pub use types::IndexerStatus;
pub use types::Intent;
pub use types::Query;
pub use types::QueryContext;
pub use types::RankingFactors;
pub use types::ResultMetadata;
pub use types::SearchResult;
pub use types::StageKind;
