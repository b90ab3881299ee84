//! Cohere `/chat` generation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use healthres_core::config::GenerationSettings;
use healthres_core::traits::Generator;
use healthres_core::types::{ChatMessage, Role};
use healthres_core::{Error, Result};

use crate::http::{bearer_client, check, transport_error};

pub const DEFAULT_ENDPOINT: &str = "https://api.cohere.com/v1";

pub struct CohereChat {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl CohereChat {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: bearer_client("Cohere", api_key, timeout)?,
            endpoint: format!("{}/chat", base_url.trim_end_matches('/')),
            model: model.to_string(),
            temperature: 0.6,
            max_tokens: None,
        })
    }

    pub fn from_settings(settings: &GenerationSettings, api_key: &str) -> Result<Self> {
        let base = settings.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        Ok(Self::new(api_key, base, &settings.model, Duration::from_secs(settings.timeout_secs))?
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Splits a conversation into Cohere's `preamble`, `chat_history` and final `message`.
fn to_request<'a>(model: &'a str, temperature: f32, max_tokens: Option<u32>, messages: &'a [ChatMessage]) -> Result<ChatRequest<'a>> {
    let (last, earlier) = messages
        .split_last()
        .ok_or_else(|| Error::Generation("cannot generate from an empty conversation".into()))?;
    let preamble: Vec<&str> =
        earlier.iter().filter(|m| m.role == Role::System).map(|m| m.content.as_str()).collect();
    let chat_history = earlier
        .iter()
        .filter_map(|m| match m.role {
            Role::User => Some(HistoryTurn { role: "USER", message: &m.content }),
            Role::Assistant => Some(HistoryTurn { role: "CHATBOT", message: &m.content }),
            Role::System => None,
        })
        .collect();
    Ok(ChatRequest {
        message: &last.content,
        model,
        temperature,
        max_tokens,
        preamble: (!preamble.is_empty()).then(|| preamble.join("\n")),
        chat_history,
    })
}

#[async_trait]
impl Generator for CohereChat {
    fn model_id(&self) -> &str { &self.model }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = to_request(&self.model, self.temperature, self.max_tokens, messages)?;
        debug!(model = %self.model, history = request.chat_history.len(), "cohere chat request");
        let resp = self.client.post(&self.endpoint).json(&request).send().await.map_err(transport_error)?;
        let parsed: ChatResponse = check(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Generation(format!("malformed chat response: {e}")))?;
        Ok(parsed.text)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preamble: Option<String>,
    chat_history: Vec<HistoryTurn<'a>>,
}

#[derive(Serialize)]
struct HistoryTurn<'a> {
    role: &'static str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    text: String,
}
