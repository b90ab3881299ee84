use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use healthres_core::traits::{Generator, TextStream};
use healthres_core::types::{ChatMessage, RankedMatch};
use healthres_core::Result;

use crate::prompt::PromptAssembler;

/// Stateless per call: prior turns are supplied by the caller each time.
pub struct Responder {
    generator: Arc<dyn Generator>,
    assembler: PromptAssembler,
}

impl Responder {
    pub fn new(generator: Arc<dyn Generator>) -> Self { Self { generator, assembler: PromptAssembler::default() } }

    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn generator(&self) -> &Arc<dyn Generator> { &self.generator }

    /// Prior turns followed by the assembled prompt as the final user turn.
    pub fn messages(&self, query: &str, matches: &[RankedMatch], history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(self.assembler.assemble(query, matches)));
        messages
    }

    pub async fn answer(&self, query: &str, matches: &[RankedMatch], history: &[ChatMessage]) -> Result<String> {
        let start = Instant::now();
        let messages = self.messages(query, matches, history);
        let text = self.generator.complete(&messages).await?;
        debug!(model = self.generator.model_id(), turns = messages.len(), elapsed_ms = start.elapsed().as_millis(), "generated answer");
        Ok(text)
    }

    pub async fn answer_stream(
        &self,
        query: &str,
        matches: &[RankedMatch],
        history: &[ChatMessage],
    ) -> Result<TextStream> {
        let messages = self.messages(query, matches, history);
        debug!(model = self.generator.model_id(), turns = messages.len(), "streaming answer");
        self.generator.stream(&messages).await
    }
}
