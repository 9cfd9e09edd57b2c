//! Grounded prompt assembly and answer generation.

use super::{RagError, Result};
use crate::config::PromptConfig;
use crate::provider::{GenerateRequest, Provider};
use std::sync::Arc;
use tracing::debug;

/// Separator placed between retrieved chunks in the `CONTEXT` block.
pub const CHUNK_DELIMITER: &str = "\n\n---\n\n";

/// Builds the grounded prompt and asks the generation model for an answer.
///
/// The prompt instructs the model to answer only from the supplied context
/// and to reply with a fixed phrase when the context does not cover the
/// question. Nothing checks the model actually complied: the output is
/// returned as-is.
#[derive(Clone)]
pub struct AnswerComposer {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    prompt: PromptConfig,
}

impl AnswerComposer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            prompt: PromptConfig::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Replaces the grounding instruction and the insufficiency reply.
    pub fn with_prompt(mut self, prompt: PromptConfig) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Renders the full prompt for `question` over `chunks`, in the given order.
    ///
    /// ```
    /// use pagewise_core::config::PromptConfig;
    /// use pagewise_core::rag::AnswerComposer;
    ///
    /// let prompt = AnswerComposer::render_prompt(&PromptConfig::default(), "Who?", &["Alice."]);
    /// assert!(prompt.contains("CONTEXT:\nAlice."));
    /// assert!(prompt.ends_with("QUESTION: Who?\n\nANSWER:"));
    /// ```
    pub fn render_prompt<S: AsRef<str>>(
        prompt: &PromptConfig,
        question: &str,
        chunks: &[S],
    ) -> String {
        let context = chunks
            .iter()
            .map(|c| c.as_ref())
            .collect::<Vec<_>>()
            .join(CHUNK_DELIMITER);

        format!(
            "{}\nIf the CONTEXT does not contain the answer, reply exactly: \"{}\".\n\n\
             CONTEXT:\n{}\n\n\
             QUESTION: {}\n\n\
             ANSWER:",
            prompt.instruction.trim_end(),
            prompt.insufficient_reply,
            context,
            question
        )
    }

    /// Renders the prompt with this composer's wording.
    pub fn build_prompt<S: AsRef<str>>(&self, question: &str, chunks: &[S]) -> String {
        Self::render_prompt(&self.prompt, question, chunks)
    }

    /// Sends one non-streaming generation request and returns the raw output.
    ///
    /// An empty `chunks` slice still produces a request, with an empty context.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationUnavailable`] if the model cannot be
    /// reached, times out or answers with an error.
    pub async fn compose<S: AsRef<str>>(&self, question: &str, chunks: &[S]) -> Result<String> {
        let prompt = self.build_prompt(question, chunks);
        debug!(
            model = %self.model,
            chunks = chunks.len(),
            prompt_chars = prompt.chars().count(),
            "Generating answer"
        );

        let request = GenerateRequest::new(&self.model, prompt).with_temperature(self.temperature);
        self.provider
            .generate(request)
            .await
            .map_err(RagError::GenerationUnavailable)
    }
}
