//! Cohere `/embed` client.

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

pub const DEFAULT_ENDPOINT: &str = "https://api.cohere.com/v1";

pub struct CohereEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dim: usize,
    max_batch: Option<usize>,
    max_retries: usize,
}

impl CohereEmbedder {
    pub fn new(api_key: &str, base_url: &str, model: &str, dim: usize, timeout: Duration) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(Error::InvalidConfig("missing embedding model name".into()));
        }
        Ok(Self {
            client: bearer_client("Cohere", api_key, timeout)?,
            endpoint: format!("{}/embed", base_url.trim_end_matches('/')),
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

    /// Splits large inputs into several requests. `None` sends everything at once.
    pub fn with_max_batch(mut self, max_batch: Option<usize>) -> Self {
        self.max_batch = max_batch.filter(|n| *n > 0);
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn embed_request(&self, texts: &[String], truncate: Truncate) -> Result<Vec<Vec<f32>>> {
        with_retries(self.max_retries, || self.send_once(texts, truncate)).await
    }

    async fn send_once(&self, texts: &[String], truncate: Truncate) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest { texts, model: &self.model, truncate: truncate.as_api_str() };
        let resp = self.client.post(&self.endpoint).json(&request).send().await.map_err(transport_error)?;
        let parsed: EmbedResponse = check(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::EmbeddingService(format!("malformed embedding response: {e}")))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(Error::EmbeddingService(format!(
                "service returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            )));
        }
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl Embedder for CohereEmbedder {
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
            rows.extend(self.embed_request(part, truncate).await?);
        }
        EmbeddingMatrix::new(self.dim, rows)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    truncate: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}
