//! Answer generation from retrieved context.

use std::sync::Arc;

use docchat_core::generation::{FragmentStream, Generator, Prompt, PromptTemplate};
use docchat_core::models::{Message, RetrievedChunk};
use docchat_core::Result;

/// Separator placed between chunk texts in the `{context}` slot.
const CONTEXT_SEPARATOR: &str = "\n\n";

pub struct AnswerGenerator {
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
}

impl AnswerGenerator {
    /// `template` must contain the `{context}` placeholder; see
    /// [`PromptTemplate::with_context_slot`].
    pub fn new(generator: Arc<dyn Generator>, template: PromptTemplate) -> Self {
        Self {
            generator,
            template,
        }
    }

    /// The prompt sent for one turn.
    pub fn prompt(&self, history: &[Message], utterance: &str, chunks: &[RetrievedChunk]) -> Prompt {
        let context = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        self.template.prompt_with_context(&context, history, utterance)
    }

    /// Start the streamed answer. Fragments arrive in generation order;
    /// the answer is their concatenation once the stream is exhausted.
    pub async fn generate(
        &self,
        history: &[Message],
        utterance: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<FragmentStream> {
        let prompt = self.prompt(history, utterance, chunks);
        self.generator.generate(&prompt).await
    }
}
