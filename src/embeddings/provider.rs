//! The `EmbeddingProvider` trait — the core's one seam onto the external
//! embedding model (§6 "Embedding provider interface").
//!
//! Grounded on the teacher's `traits::EmbeddingProvider` shape (referenced
//! from `embeddings/openai.rs` and `embeddings/queue.rs`): `embed`,
//! `embed_batch`, `name`, `dimension`. The hybrid searcher never calls this
//! directly — per spec §4.2 it receives an already-computed vector from the
//! caller — but the pipeline's retriever layer uses it to produce that
//! vector when the caller supplies raw query text only.

use async_trait::async_trait;

use crate::error::Result;

/// An external text-embedding model, reached over whatever transport the
/// implementation chooses (HTTP, in-process ONNX, ...). The core never
/// assumes a particular one.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short identifier used in logs and metrics, never in error bodies.
    fn name(&self) -> &str;

    /// Dimensionality of vectors this provider returns.
    fn dimension(&self) -> i32;

    /// Embed a single piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// A provider that always reports "unavailable". Used where a pipeline is
/// constructed without vector search configured: the hybrid searcher's
/// vector stage contract (§4.2 step 2) is "skipped when embedding not
/// available", so this makes that the explicit default rather than an
/// `Option<Arc<dyn EmbeddingProvider>>` threaded through every call site.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for NoopEmbeddingProvider {
    fn name(&self) -> &str {
        "noop"
    }

    fn dimension(&self) -> i32 {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(crate::error::CoreError::internal(
            "no embedding provider configured",
        ))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(crate::error::CoreError::internal(
            "no embedding provider configured",
        ))
    }
}
