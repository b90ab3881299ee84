//! OpenAI-compatible `/chat/completions` generation with SSE streaming.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use healthres_core::config::GenerationSettings;
use healthres_core::traits::{Generator, TextStream};
use healthres_core::types::ChatMessage;
use healthres_core::{Error, Result};

use crate::http::{bearer_client, check, transport_error};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAiChat {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: bearer_client("OpenAI", api_key, timeout)?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
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

    async fn post(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        if messages.is_empty() {
            return Err(Error::Generation("cannot generate from an empty conversation".into()));
        }
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        };
        debug!(model = %self.model, turns = messages.len(), stream, "chat completion request");
        let resp = self.client.post(&self.endpoint).json(&request).send().await.map_err(transport_error)?;
        check(resp).await
    }
}

#[async_trait]
impl Generator for OpenAiChat {
    fn model_id(&self) -> &str { &self.model }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let parsed: ChatResponse = self
            .post(messages, false)
            .await?
            .json()
            .await
            .map_err(|e| Error::Generation(format!("malformed chat response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| Error::Generation("response contained no choices".into()))
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let resp = self.post(messages, true).await?;
        Ok(delta_stream(resp.bytes_stream().eventsource().map(|event| event.map_err(event_error))))
    }
}

fn delta_text(data: &str) -> Result<Option<String>> {
    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| Error::Generation(format!("malformed stream chunk: {e}")))?;
    Ok(chunk.choices.into_iter().next().and_then(|c| c.delta.content).filter(|t| !t.is_empty()))
}

fn event_error(err: EventStreamError<reqwest::Error>) -> Error {
    match err {
        EventStreamError::Transport(e) => transport_error(e),
        other => Error::Generation(format!("malformed event stream: {other}")),
    }
}

/// Turns server-sent events into the content deltas of a chat completion.
/// The stream ends at `[DONE]` or after the first error.
fn delta_stream<S>(events: S) -> TextStream
where
    S: Stream<Item = Result<Event>> + Send + 'static,
{
    stream::unfold((Box::pin(events), false), |(mut events, finished)| async move {
        if finished {
            return None;
        }
        loop {
            match events.next().await? {
                Ok(event) if event.data == "[DONE]" => return None,
                Ok(event) if event.data.is_empty() => {}
                Ok(event) => match delta_text(&event.data) {
                    Ok(Some(text)) => return Some((Ok(text), (events, false))),
                    Ok(None) => {}
                    Err(e) => return Some((Err(e), (events, true))),
                },
                Err(e) => return Some((Err(e), (events, true))),
            }
        }
    })
    .boxed()
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> String { format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{text}\"}}}}]}}\n\n") }

    async fn collect(parts: Vec<Vec<u8>>) -> Vec<Result<String>> {
        let events = stream::iter(parts.into_iter().map(Ok::<_, std::convert::Infallible>))
            .eventsource()
            .map(|event| event.map_err(|e| Error::Generation(format!("{e:?}"))));
        delta_stream(events).collect().await
    }

    fn texts(out: Vec<Result<String>>) -> Vec<String> { out.into_iter().map(|r| r.expect("chunk")).collect() }

    #[tokio::test]
    async fn deltas_survive_chunk_boundaries() {
        let body = format!("{}{}: keep-alive\n\n{}data: [DONE]\n\n", chunk("Sleep "), chunk("helps"), chunk("."));
        let (a, b) = body.split_at(17);
        let (b, c) = b.split_at(40);
        let out = collect(vec![a.into(), b.into(), c.into()]).await;
        assert_eq!(texts(out).concat(), "Sleep helps.");
    }

    #[tokio::test]
    async fn code_point_split_across_chunks_is_kept_whole() {
        let body = chunk("café").into_bytes();
        let cut = body.windows(2).position(|w| w == "é".as_bytes()).expect("é") + 1;
        let out = collect(vec![body[..cut].to_vec(), body[cut..].to_vec()]).await;
        assert_eq!(texts(out), vec!["café".to_string()]);
    }

    #[tokio::test]
    async fn nothing_after_done_is_emitted() {
        let body = format!("{}data: [DONE]\n\n{}", chunk("a"), chunk("b"));
        let out = collect(vec![body.into_bytes()]).await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn role_only_and_empty_deltas_are_skipped() {
        let body = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n";
        assert_eq!(collect(vec![body.into(), chunk("x").into_bytes()]).await.len(), 1);
    }

    #[tokio::test]
    async fn malformed_chunk_ends_stream_with_error() {
        let out = collect(vec![b"data: {not json}\n\n".to_vec(), chunk("late").into_bytes()]).await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(Error::Generation(_))));
    }

    #[tokio::test]
    async fn crlf_framing_is_accepted() {
        let out = collect(vec![chunk("one").replace('\n', "\r\n").into_bytes()]).await;
        assert_eq!(texts(out), vec!["one".to_string()]);
    }
}
