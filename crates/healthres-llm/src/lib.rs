//! healthres-llm
//!
//! Prompt assembly over ranked matches and the chat models that answer it.

use std::sync::Arc;

use tracing::info;

use healthres_core::config::{secret, GenerationProvider, GenerationSettings};
use healthres_core::traits::Generator;
use healthres_core::Result;

pub mod cohere;
mod http;
pub mod openai;
pub mod prompt;
pub mod responder;

pub use cohere::CohereChat;
pub use openai::OpenAiChat;
pub use prompt::{PromptAssembler, NO_RESULTS, PROMPT_TEMPLATE};
pub use responder::Responder;

pub fn build_generator(settings: &GenerationSettings) -> Result<Arc<dyn Generator>> {
    info!(provider = ?settings.provider, model = %settings.model, "using chat model");
    let generator: Arc<dyn Generator> = match settings.provider {
        GenerationProvider::Cohere => Arc::new(CohereChat::from_settings(settings, &secret("COHERE_API_KEY")?)?),
        GenerationProvider::OpenAi => Arc::new(OpenAiChat::from_settings(settings, &secret("OPENAI_API_KEY")?)?),
    };
    Ok(generator)
}
