use thiserror::Error;

/// Failure taxonomy shared by every stage of the pipeline.
///
/// Construction-phase errors halt the startup sequence; per-query errors are
/// surfaced to the caller together with [`Error::user_message`]. An empty
/// result set is never an error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Data load failed: {0}")]
    DataLoad(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Index '{index}' configuration mismatch: {detail}")]
    IndexConfigMismatch { index: String, detail: String },

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Upsert batch at offset {offset} ({len} records) failed: {reason}")]
    UpsertBatch { offset: usize, len: usize, reason: String },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn index_mismatch(index: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::IndexConfigMismatch { index: index.into(), detail: detail.into() }
    }

    /// Short message suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::DataLoad(_) => "The research corpus could not be loaded.",
            Self::EmbeddingService(_) => "The embedding service could not process the query.",
            Self::IndexConfigMismatch { .. } => "The search index does not match the embedding model.",
            Self::VectorStore(_) | Self::UpsertBatch { .. } => "The vector database request failed.",
            Self::Generation(_) => "The language model could not produce an answer.",
            Self::Timeout(_) => "A remote service took too long to respond.",
            Self::InvalidConfig(_) => "The application is misconfigured.",
        }
    }

    /// Offset of the first record of a failed upsert batch, for resumption.
    pub fn batch_offset(&self) -> Option<usize> {
        match self {
            Self::UpsertBatch { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Whether a caller-side retry with backoff may succeed.
    ///
    /// Nothing in this workspace retries on its own unless explicitly configured.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::EmbeddingService(msg) | Self::VectorStore(msg) | Self::Generation(msg) => {
                msg.starts_with("HTTP 429") || msg.starts_with("HTTP 5") || msg.starts_with("transport")
            }
            Self::UpsertBatch { .. } => true,
            Self::DataLoad(_) | Self::IndexConfigMismatch { .. } | Self::InvalidConfig(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_offset_only_for_upsert_failures() {
        let err = Error::UpsertBatch { offset: 256, len: 44, reason: "quota".into() };
        assert_eq!(err.batch_offset(), Some(256));
        assert!(err.to_string().contains("offset 256"));
        assert_eq!(Error::VectorStore("x".into()).batch_offset(), None);
    }

    #[test]
    fn mismatch_is_not_retryable() {
        let err = Error::index_mismatch("mh", "dimension 768 != 1024");
        assert!(!err.is_retryable());
        assert!(Error::Timeout("embed".into()).is_retryable());
        assert!(Error::EmbeddingService("HTTP 429 Too Many Requests".into()).is_retryable());
    }
}
