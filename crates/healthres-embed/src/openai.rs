//! OpenAI `/embeddings` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use healthres_core::config::EmbeddingSettings;
use healthres_core::traits::Embedder;
use healthres_core::types::{EmbeddingMatrix, Truncate};
use healthres_core::{Error, Result};

use crate::http::{bearer_client, check, transport_error, with_retries};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Embeds through an OpenAI-compatible service.
///
/// The endpoint has no truncation option: overly long inputs are rejected by
/// the service whatever `Truncate` mode the caller passes.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dim: usize,
    max_batch: Option<usize>,
    max_retries: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, base_url: &str, model: &str, dim: usize, timeout: Duration) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(Error::InvalidConfig("missing embedding model name".into()));
        }
        Ok(Self {
            client: bearer_client("OpenAI", api_key, timeout)?,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dim,
            max_batch: None,
            max_retries: 0,
        })
    }

    pub fn from_settings(settings: &EmbeddingSettings, api_key: &str) -> Result<Self> {
        Ok(Self::new(
            api_key,
            settings.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT),
            &settings.model,
            settings.dimension,
            Duration::from_secs(settings.timeout_secs),
        )?
        .with_max_batch(settings.max_batch)
        .with_max_retries(settings.max_retries))
    }

    pub fn with_max_batch(mut self, max_batch: Option<usize>) -> Self {
        self.max_batch = max_batch.filter(|n| *n > 0);
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn send_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest { input: texts, model: &self.model };
        let resp = self.client.post(&self.endpoint).json(&request).send().await.map_err(transport_error)?;
        let parsed: EmbeddingsResponse = check(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::EmbeddingService(format!("malformed embedding response: {e}")))?;
        rows_in_input_order(parsed.data, texts.len())
    }
}

/// Orders rows by their `index`; every input position must appear exactly once.
fn rows_in_input_order(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(Error::EmbeddingService(format!(
            "service returned {} embeddings for {expected} inputs",
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    if data.iter().enumerate().any(|(i, d)| d.index != i) {
        return Err(Error::EmbeddingService("embedding indexes do not cover the inputs".into()));
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str { &self.model }

    fn dim(&self) -> usize { self.dim }

    async fn embed_batch(&self, texts: &[String], truncate: Truncate) -> Result<EmbeddingMatrix> {
        if texts.is_empty() {
            return EmbeddingMatrix::new(self.dim, Vec::new());
        }
        let chunk = self.max_batch.unwrap_or(texts.len());
        let mut rows = Vec::with_capacity(texts.len());
        for part in texts.chunks(chunk) {
            debug!(texts = part.len(), model = %self.model, truncate = truncate.as_api_str(), "embedding request");
            rows.extend(with_retries(self.max_retries, || self.send_once(part)).await?);
        }
        EmbeddingMatrix::new(self.dim, rows)
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index: usize, value: f32) -> EmbeddingData { EmbeddingData { index, embedding: vec![value] } }

    #[test]
    fn rows_follow_the_index_field() {
        let rows = rows_in_input_order(vec![row(1, 1.0), row(0, 0.0)], 2).expect("rows");
        assert_eq!(rows, vec![vec![0.0], vec![1.0]]);
    }

    #[test]
    fn duplicate_or_missing_indexes_are_rejected() {
        assert!(rows_in_input_order(vec![row(0, 0.0), row(0, 1.0)], 2).is_err());
        assert!(rows_in_input_order(vec![row(0, 0.0)], 2).is_err());
    }
}
