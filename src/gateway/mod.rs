//! Thin async REST client over the remote index service.
//!
//! Grounded on the embedding HTTP client's header-auth + typed-error-mapping
//! shape, generalized with the exponential-backoff retry loop used for batch
//! embedding requests elsewhere in this codebase: same `base * 2^attempt`
//! growth, extended here with a cap and jitter per the gateway's own retry
//! contract.

pub mod types;

use std::time::Duration;

use rand::Rng;
use reqwest::Method;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::config::BackendConfig;
use crate::error::CoreError;
use crate::error::Result;
use crate::types::IndexerOverallStatus;
use crate::types::IndexerRunResult;
use crate::types::IndexerStatus;

use self::types::AggregateIndexStats;
use self::types::AggregateStatsResponse;
use self::types::IndexAction;
use self::types::IndexBatchRequest;
use self::types::IndexBatchResponse;
use self::types::IndexBatchResultItem;
use self::types::IndexListResponse;
use self::types::IndexStats;
use self::types::IndexerStatusResponse;
use self::types::RunIndexerOutcome;
use self::types::SearchRequest;
use self::types::SearchResponse;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Batch upload/delete limits enforced client-side before the request
/// ever reaches the wire (§4.1, §6).
const MAX_BATCH_DOCUMENTS: usize = 1000;
const MAX_BATCH_BYTES: usize = 16 * 1024 * 1024;

/// Async client for the backend's search/index/indexer REST surface.
///
/// Safe for concurrent use by many callers: it owns a single pooled
/// `reqwest::Client` and carries no mutable state of its own.
pub struct SearchGateway {
    client: reqwest::Client,
    config: BackendConfig,
}

impl SearchGateway {
    /// Build a gateway from backend configuration. Construction itself
    /// cannot fail — connection establishment is lazy, per request.
    pub fn new(config: BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.connection_pool_size)
            .timeout(Duration::from_secs(config.rest_timeout_seconds))
            .build()
            .expect("reqwest client with static configuration never fails to build");
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    /// Release the underlying HTTP client. `reqwest` has no explicit
    /// connection-pool teardown API; this exists so the pipeline's teardown
    /// path has one method to call regardless of client implementation.
    pub fn close(self) {
        drop(self);
    }

    /// `POST /indexes/{index}/docs/search`.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let path = format!(
            "/indexes/{}/docs/search?api-version=2025-05-01-preview",
            self.config.index_name
        );
        self.request_with_retry(Method::POST, &path, Some(request))
            .await
    }

    /// `GET /indexes/{index}?…`.
    pub async fn get_index(&self, name: &str) -> Result<serde_json::Value> {
        let path = format!("/indexes('{name}')?api-version=2025-05-01-preview");
        self.request_with_retry::<(), _>(Method::GET, &path, None).await
    }

    /// `GET /indexes`.
    pub async fn list_indexes(&self) -> Result<Vec<serde_json::Value>> {
        let path = "/indexes?api-version=2025-05-01-preview".to_string();
        let response: IndexListResponse =
            self.request_with_retry::<(), _>(Method::GET, &path, None).await?;
        Ok(response.value)
    }

    /// `PUT /indexes/{index}`. `definition` is passed through verbatim;
    /// index schema authoring is out of scope for this core.
    pub async fn create_index(&self, name: &str, definition: &serde_json::Value) -> Result<serde_json::Value> {
        let path = format!("/indexes('{name}')?api-version=2025-05-01-preview");
        self.request_with_retry(Method::PUT, &path, Some(definition)).await
    }

    /// `DELETE /indexes/{index}`.
    pub async fn delete_index(&self, name: &str) -> Result<()> {
        let path = format!("/indexes('{name}')?api-version=2025-05-01-preview");
        let _: serde_json::Value = self
            .request_with_retry::<(), _>(Method::DELETE, &path, None)
            .await
            .or_else(|e| match e {
                CoreError::Internal { .. } => Ok(serde_json::Value::Null),
                other => Err(other),
            })?;
        Ok(())
    }

    /// `POST /indexes/{index}/docs/index` with `@search.action: upload`.
    ///
    /// Enforces the batch limits from §4.1/§6 client-side: at most 1000
    /// documents and 16 MiB of serialized payload per call.
    pub async fn upload_documents(&self, documents: Vec<serde_json::Value>) -> Result<Vec<IndexBatchResultItem>> {
        let actions: Vec<IndexAction> = documents
            .into_iter()
            .map(|document| IndexAction { action: "upload", document })
            .collect();
        self.run_batch(actions).await
    }

    /// `POST /indexes/{index}/docs/index` with `@search.action: delete`.
    /// `key_field` names the index's key field (e.g. `"id"`).
    pub async fn delete_documents(&self, key_field: &str, keys: Vec<String>) -> Result<Vec<IndexBatchResultItem>> {
        let actions: Vec<IndexAction> = keys
            .into_iter()
            .map(|key| {
                let mut document = serde_json::Map::new();
                document.insert(key_field.to_string(), serde_json::Value::String(key));
                IndexAction {
                    action: "delete",
                    document: serde_json::Value::Object(document),
                }
            })
            .collect();
        self.run_batch(actions).await
    }

    async fn run_batch(&self, actions: Vec<IndexAction>) -> Result<Vec<IndexBatchResultItem>> {
        if actions.len() > MAX_BATCH_DOCUMENTS {
            return Err(CoreError::validation(format!(
                "batch of {} documents exceeds the {MAX_BATCH_DOCUMENTS}-document limit",
                actions.len()
            )));
        }
        let request = IndexBatchRequest { value: actions };
        let payload_size = serde_json::to_vec(&request)
            .map(|bytes| bytes.len())
            .unwrap_or(0);
        if payload_size > MAX_BATCH_BYTES {
            return Err(CoreError::validation(format!(
                "batch payload of {payload_size} bytes exceeds the {MAX_BATCH_BYTES}-byte limit"
            )));
        }

        let path = format!(
            "/indexes/{}/docs/index?api-version=2025-05-01-preview",
            self.config.index_name
        );
        let response: IndexBatchResponse = self.request_with_retry(Method::POST, &path, Some(&request)).await?;
        Ok(response.value)
    }

    /// `GET /indexes('{index}')/search.stats`.
    pub async fn index_stats(&self) -> Result<IndexStats> {
        let path = format!(
            "/indexes('{}')/search.stats?api-version=2025-05-01-preview",
            self.config.index_name
        );
        self.request_with_retry::<(), _>(Method::GET, &path, None).await
    }

    /// `GET /indexstats`, aggregated across indexes.
    pub async fn aggregate_stats(&self) -> Result<Vec<AggregateIndexStats>> {
        let path = "/indexstats?api-version=2025-05-01-preview".to_string();
        let response: AggregateStatsResponse =
            self.request_with_retry::<(), _>(Method::GET, &path, None).await?;
        Ok(response.value)
    }

    /// `GET /indexers('{name}')/search.status`.
    pub async fn get_indexer_status(&self, name: &str) -> Result<IndexerStatus> {
        let path = format!(
            "/indexers('{name}')/search.status?api-version=2025-05-01-preview"
        );
        let response: IndexerStatusResponse = self
            .request_with_retry::<(), _>(Method::GET, &path, None)
            .await?;
        Ok(normalize_indexer_status(response))
    }

    /// `POST /indexers/{name}/run`, optionally polling to completion.
    ///
    /// When `wait=true`, polls [`Self::get_indexer_status`] every
    /// `poll_interval` until `last_result.status` is terminal or `timeout`
    /// elapses, returning `TimedOut` in the latter case without raising.
    pub async fn run_indexer(
        &self,
        name: &str,
        wait: bool,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<RunIndexerOutcome> {
        let path = format!("/indexers/{name}/run?api-version=2025-05-01-preview");
        let _: serde_json::Value = self
            .request_with_retry::<(), _>(Method::POST, &path, None)
            .await
            .or_else(|e| match e {
                // An empty 2xx body with no JSON payload is a normal
                // response from this endpoint; only surface real failures.
                CoreError::Internal { .. } => Ok(serde_json::Value::Null),
                other => Err(other),
            })?;

        if !wait {
            return Ok(RunIndexerOutcome::Started);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let status = self.get_indexer_status(name).await?;
            if let Some(result) = &status.last_result {
                if matches!(result.status.as_str(), "success" | "transientFailure" | "error") {
                    return Ok(RunIndexerOutcome::Completed {
                        status: result.status.clone(),
                    });
                }
            }
            if Instant::now() >= deadline {
                return Ok(RunIndexerOutcome::TimedOut);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Issue a request, retrying on retryable status codes and transport
    /// errors with exponential backoff, full jitter, and a hard attempt cap.
    async fn request_with_retry<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let start = Instant::now();
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .header("api-key", &self.config.api_key);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let outcome = builder.send().await;
            let elapsed_ms = start.elapsed().as_millis();

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        tracing::debug!(
                            method = %method,
                            path = %path,
                            status = status.as_u16(),
                            attempt,
                            elapsed_ms,
                            "gateway request succeeded"
                        );
                        return response.json::<T>().await.map_err(|e| CoreError::Internal {
                            cause: format!("failed to decode response body: {e}"),
                        });
                    }

                    if CoreError::is_retryable_status(status.as_u16()) && attempt < MAX_ATTEMPTS {
                        tracing::warn!(
                            method = %method,
                            path = %path,
                            status = status.as_u16(),
                            attempt,
                            elapsed_ms,
                            "gateway request failed, retrying"
                        );
                        self.backoff_sleep(attempt).await;
                        continue;
                    }

                    if CoreError::is_retryable_status(status.as_u16()) {
                        return Err(CoreError::BackendTransientError {
                            status: status.as_u16(),
                            method: method.to_string(),
                            path: path.to_string(),
                            attempt,
                        });
                    }
                    return Err(CoreError::BackendPermanentError {
                        status: status.as_u16(),
                        method: method.to_string(),
                        path: path.to_string(),
                    });
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if attempt < MAX_ATTEMPTS {
                        tracing::warn!(
                            method = %method,
                            path = %path,
                            attempt,
                            elapsed_ms,
                            "gateway transport error, retrying"
                        );
                        self.backoff_sleep(attempt).await;
                        continue;
                    }
                    return Err(CoreError::BackendTransientError {
                        status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
                        method: method.to_string(),
                        path: path.to_string(),
                        attempt,
                    });
                }
                Err(e) => {
                    return Err(CoreError::Internal {
                        cause: format!("gateway request construction/transport failure on {method} {path}: {e}"),
                    });
                }
            }
        }
    }

    async fn backoff_sleep(&self, attempt: u32) {
        let exp = BASE_DELAY.saturating_mul(1u32 << attempt.min(10));
        let capped = exp.min(MAX_DELAY);
        let jittered = Duration::from_millis(rand::rng().random_range(0..=capped.as_millis() as u64).max(1));
        tokio::time::sleep(jittered).await;
    }
}

fn normalize_indexer_status(response: IndexerStatusResponse) -> IndexerStatus {
    let overall_status = match response.status.as_str() {
        "running" => IndexerOverallStatus::Running,
        "error" => IndexerOverallStatus::Error,
        _ => IndexerOverallStatus::Unknown,
    };

    let to_run_result = |r: types::IndexerExecutionResult| IndexerRunResult {
        status: r.status,
        start_time: r.start_time,
        end_time: r.end_time,
        errors: r.errors,
        warnings: r.warnings,
        items_processed: r.items_processed,
        items_failed: r.items_failed,
    };

    let mut history: Vec<IndexerRunResult> = response
        .execution_history
        .into_iter()
        .map(to_run_result)
        .collect();
    history.truncate(5);

    IndexerStatus {
        overall_status,
        last_result: response.last_result.map(to_run_result),
        execution_history: history,
        max_run_time_seconds: response.limits.and_then(|l| l.max_run_time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BackendConfig {
        BackendConfig {
            endpoint: "https://example.search.windows.net".into(),
            api_key: "test-key".into(),
            index_name: "code-index".into(),
            rest_timeout_seconds: 30,
            indexer_timeout_seconds: 300,
            indexer_poll_interval_seconds: 2,
            semantic_config_name: "semantic-config".into(),
            connection_pool_size: 32,
        }
    }

    #[test]
    fn url_joins_endpoint_and_path_without_double_slash() {
        let gateway = SearchGateway::new(test_config());
        assert_eq!(
            gateway.url("/indexes/foo"),
            "https://example.search.windows.net/indexes/foo"
        );
    }

    #[tokio::test]
    async fn upload_documents_rejects_batches_over_the_document_limit() {
        let gateway = SearchGateway::new(test_config());
        let docs: Vec<serde_json::Value> = (0..(MAX_BATCH_DOCUMENTS + 1))
            .map(|i| serde_json::json!({ "id": i.to_string() }))
            .collect();
        let err = gateway.upload_documents(docs).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError { .. }));
    }

    #[test]
    fn delete_documents_uses_the_caller_supplied_key_field() {
        let key = "doc-1".to_string();
        let mut document = serde_json::Map::new();
        document.insert("chunk_id".to_string(), serde_json::Value::String(key.clone()));
        let action = IndexAction {
            action: "delete",
            document: serde_json::Value::Object(document),
        };
        assert_eq!(action.document["chunk_id"], serde_json::Value::String(key));
    }

    #[test]
    fn normalize_indexer_status_truncates_history_to_five() {
        let response = IndexerStatusResponse {
            status: "running".into(),
            last_result: None,
            execution_history: (0..8)
                .map(|i| types::IndexerExecutionResult {
                    status: "success".into(),
                    start_time: None,
                    end_time: None,
                    errors: Vec::new(),
                    warnings: Vec::new(),
                    items_processed: i,
                    items_failed: 0,
                })
                .collect(),
            limits: None,
        };
        let status = normalize_indexer_status(response);
        assert_eq!(status.execution_history.len(), 5);
        assert_eq!(status.overall_status, IndexerOverallStatus::Running);
    }
}
