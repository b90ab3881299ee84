use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{Error, Result};
use crate::types::{BackendKind, ChatMessage, EmbeddingMatrix, IndexHandle, IndexSpec, RankedMatch, Truncate, VectorRecord};

/// Finite, non-restartable sequence of generated text chunks.
pub type TextStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Pinned model identifier; embeddings are only comparable within one model.
    fn model_id(&self) -> &str;
    /// Width of every vector this embedder produces.
    fn dim(&self) -> usize;
    /// Embeds `texts` in order; one row per input.
    async fn embed_batch(&self, texts: &[String], truncate: Truncate) -> Result<EmbeddingMatrix>;

    async fn embed_one(&self, text: &str, truncate: Truncate) -> Result<Vec<f32>> {
        let matrix = self.embed_batch(&[text.to_string()], truncate).await?;
        matrix
            .into_rows()
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingService("service returned no embedding for the query".into()))
    }
}

/// Nearest-neighbour capability the retrieval facade depends on.
///
/// Implementations return matches ordered by descending score, already carrying
/// metadata, whatever the native result shape of the backend.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn kind(&self) -> BackendKind;
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<RankedMatch>>;
}

/// Named vector index hosted by a store (managed service or embedded database).
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn provider(&self) -> &str;
    /// Reuses the named index when it exists with the same dimension and metric,
    /// creates it otherwise, and fails with `IndexConfigMismatch` on any conflict.
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexHandle>;
    /// Writes one batch; the batch is applied entirely or reported as failed.
    async fn upsert(&self, index: &IndexHandle, records: &[VectorRecord]) -> Result<()>;
    async fn query(&self, index: &IndexHandle, vector: &[f32], k: usize) -> Result<Vec<RankedMatch>>;
    async fn count(&self, index: &IndexHandle) -> Result<usize>;
    /// What the index was last fully populated from, as recorded by `set_provenance`.
    async fn provenance(&self, index: &IndexHandle) -> Result<Option<String>>;
    async fn set_provenance(&self, index: &IndexHandle, provenance: &str) -> Result<()>;
    /// Removes every stored vector while keeping the index itself.
    async fn clear(&self, index: &IndexHandle) -> Result<()>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Streams the answer. Providers without native streaming yield the whole
    /// completion as a single chunk.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let text = self.complete(messages).await?;
        Ok(stream::iter(vec![Ok(text)]).boxed())
    }
}
