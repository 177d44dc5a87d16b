//! Wire-level request/response shapes for the backend's REST surface.
//!
//! These mirror the Azure-AI-Search-compatible endpoints this crate talks
//! to (`api-version=2025-05-01-preview` or equivalent). Nothing here is
//! exposed to callers of the core directly — [`crate::gateway::SearchGateway`]
//! always returns normalized [`crate::types::SearchResult`]s.

use serde::Deserialize;
use serde::Serialize;

/// A single `{kind:"vector", ...}` entry in a search request.
#[derive(Debug, Clone, Serialize)]
pub struct VectorQuery {
    pub kind: &'static str,
    pub vector: Vec<f32>,
    pub k: i32,
    pub fields: String,
}

impl VectorQuery {
    pub fn new(vector: Vec<f32>, k: i32, fields: impl Into<String>) -> Self {
        Self {
            kind: "vector",
            vector,
            k,
            fields: fields.into(),
        }
    }
}

/// The query type for a search request.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Simple,
    Semantic,
}

/// Body of a `POST /indexes/{index}/docs/search` request.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub search: String,
    #[serde(rename = "queryType")]
    pub query_type: QueryType,
    #[serde(rename = "semanticConfiguration", skip_serializing_if = "Option::is_none")]
    pub semantic_configuration: Option<String>,
    #[serde(rename = "queryCaption", skip_serializing_if = "Option::is_none")]
    pub query_caption: Option<String>,
    #[serde(rename = "queryAnswer", skip_serializing_if = "Option::is_none")]
    pub query_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub top: i32,
    pub skip: i32,
    #[serde(rename = "orderby", skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(rename = "highlightFields", skip_serializing_if = "Option::is_none")]
    pub highlight_fields: Option<String>,
    #[serde(rename = "includeTotalCount")]
    pub include_total_count: bool,
    #[serde(rename = "vectorQueries", skip_serializing_if = "Vec::is_empty")]
    pub vector_queries: Vec<VectorQuery>,
}

/// A single document returned from `docs/search`, field names as the
/// backend's index schema defines them.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchDocument {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub start_line: Option<i32>,
    #[serde(default)]
    pub end_line: Option<i32>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub modified_time: Option<i64>,
    #[serde(rename = "@search.score", default)]
    pub search_score: f32,
    #[serde(rename = "@search.highlights", default)]
    pub highlights: std::collections::BTreeMap<String, Vec<String>>,
}

/// Response body of `docs/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default, rename = "value")]
    pub value: Vec<SearchDocument>,
    #[serde(rename = "@odata.count", default)]
    pub count: Option<i64>,
}

/// Execution result of a single indexer run, as returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerExecutionResult {
    #[serde(default)]
    pub status: String,
    #[serde(rename = "startTime", default)]
    pub start_time: Option<String>,
    #[serde(rename = "endTime", default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(rename = "itemsProcessed", default)]
    pub items_processed: i64,
    #[serde(rename = "itemsFailed", default)]
    pub items_failed: i64,
}

/// Backend `search.status` response limits block.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerLimits {
    #[serde(rename = "maxRunTime", default)]
    pub max_run_time: Option<i64>,
}

/// Response body of `GET /indexers('{name}')/search.status`.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerStatusResponse {
    #[serde(default)]
    pub status: String,
    #[serde(rename = "lastResult", default)]
    pub last_result: Option<IndexerExecutionResult>,
    #[serde(rename = "executionHistory", default)]
    pub execution_history: Vec<IndexerExecutionResult>,
    #[serde(default)]
    pub limits: Option<IndexerLimits>,
}

/// Outcome of `run_indexer(wait=true)`.
#[derive(Debug, Clone, PartialEq)]
pub enum RunIndexerOutcome {
    Started,
    Completed { status: String },
    TimedOut,
}

/// A single action in a batch upload/delete request.
#[derive(Debug, Clone, Serialize)]
pub struct IndexAction {
    #[serde(rename = "@search.action")]
    pub action: &'static str,
    #[serde(flatten)]
    pub document: serde_json::Value,
}

/// Body of `POST /indexes/{index}/docs/index`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexBatchRequest {
    pub value: Vec<IndexAction>,
}

/// Per-document outcome reported back from a batch upload/delete.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexBatchResultItem {
    pub key: String,
    #[serde(rename = "status")]
    pub succeeded: bool,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
    #[serde(rename = "statusCode", default)]
    pub status_code: Option<u16>,
}

/// Response body of `POST /indexes/{index}/docs/index`.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexBatchResponse {
    #[serde(default, rename = "value")]
    pub value: Vec<IndexBatchResultItem>,
}

/// `GET /indexes('{index}')/search.stats`.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexStats {
    #[serde(rename = "documentCount", default)]
    pub document_count: i64,
    #[serde(rename = "storageSize", default)]
    pub storage_size: i64,
    #[serde(rename = "vectorIndexSize", default)]
    pub vector_index_size: i64,
}

/// A single entry of `GET /indexstats`.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregateIndexStats {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "documentCount", default)]
    pub document_count: i64,
    #[serde(rename = "storageSize", default)]
    pub storage_size: i64,
}

/// `GET /indexes` list wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexListResponse {
    #[serde(default, rename = "value")]
    pub value: Vec<serde_json::Value>,
}

/// `GET /indexstats` aggregate wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregateStatsResponse {
    #[serde(default, rename = "value")]
    pub value: Vec<AggregateIndexStats>,
}
