//! Embedding providers: remote Cohere and OpenAI clients and a deterministic fake.

use std::sync::Arc;

use tracing::info;

use healthres_core::config::{secret, EmbeddingProvider, EmbeddingSettings};
use healthres_core::traits::Embedder;
use healthres_core::Result;

pub mod cohere;
pub mod fake;
mod http;
pub mod openai;

pub use cohere::CohereEmbedder;
pub use fake::FakeEmbedder;
pub use openai::OpenAiEmbedder;

/// Builds the configured embedder. `APP_USE_FAKE_EMBEDDINGS=1` forces the fake.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let embedder: Arc<dyn Embedder> = match settings.provider {
        EmbeddingProvider::Fake => {
            info!(dim = settings.dimension, "using fake embedder");
            Arc::new(FakeEmbedder::new(settings.dimension))
        }
        _ if use_fake => {
            info!(dim = settings.dimension, "using fake embedder");
            Arc::new(FakeEmbedder::new(settings.dimension))
        }
        EmbeddingProvider::Cohere => {
            let api_key = secret("COHERE_API_KEY")?;
            info!(model = %settings.model, "using Cohere embedder");
            Arc::new(CohereEmbedder::from_settings(settings, &api_key)?)
        }
        EmbeddingProvider::OpenAi => {
            let api_key = secret("OPENAI_API_KEY")?;
            info!(model = %settings.model, "using OpenAI embedder");
            Arc::new(OpenAiEmbedder::from_settings(settings, &api_key)?)
        }
    };
    Ok(embedder)
}
