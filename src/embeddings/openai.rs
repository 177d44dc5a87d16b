//! An OpenAI-compatible embedding provider.
//!
//! Grounded on the teacher's `embeddings/openai.rs` (reqwest client,
//! bearer-header auth, sorted-by-index batch decoding); adapted to the
//! core's own error taxonomy (`CoreError::EmbeddingFailed`) instead of the
//! teacher's `RetrievalErr`.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::error::CoreError;
use crate::error::Result;

use super::provider::EmbeddingProvider;

const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Embedding provider backed by the OpenAI (or a compatible) embeddings
/// endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    api_key: String,
    model: String,
    dimension: i32,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: impl Into<String>, dimension: i32) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            dimension,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request_embeddings(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbeddingRequest {
            model: self.model.clone(),
            input,
            dimensions: Some(self.dimension),
            encoding_format: Some("float".to_string()),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| CoreError::EmbeddingFailed {
                cause: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            // Never interpolate the response body into the error (§7).
            return Err(CoreError::EmbeddingFailed {
                cause: format!("embedding request failed with status {status}"),
            });
        }

        let result: EmbeddingResponse =
            response.json().await.map_err(|e| CoreError::EmbeddingFailed {
                cause: e.to_string(),
            })?;

        let mut embeddings: Vec<(i32, Vec<f32>)> =
            result.data.into_iter().map(|e| (e.index, e.embedding)).collect();
        embeddings.sort_by_key(|(idx, _)| *idx);

        Ok(embeddings.into_iter().map(|(_, e)| e).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> i32 {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.request_embeddings(vec![text.to_string()]).await?;
        results.into_iter().next().ok_or_else(|| CoreError::EmbeddingFailed {
            cause: "empty embedding response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_embeddings(texts.to_vec()).await
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding_format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: i32,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_reflects_constructor_argument() {
        let provider = OpenAiEmbeddings::new("test-key", 1536);
        assert_eq!(provider.dimension(), 1536);
    }

    #[test]
    fn with_model_overrides_default() {
        let provider = OpenAiEmbeddings::new("test-key", 3072).with_model("text-embedding-3-large");
        assert_eq!(provider.model, "text-embedding-3-large");
    }
}
