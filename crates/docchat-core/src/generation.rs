//! Text generation capability and prompt assembly.
//!
//! A [`Generator`] answers a [`Prompt`] either in one piece
//! ([`rewrite`](Generator::rewrite)) or as a lazy stream of text fragments
//! ([`generate`](Generator::generate)). Prompts are built from a plain-text
//! instruction template, the prior conversation, and the current utterance.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::{Error, Result};
use crate::models::Message;

/// Placeholder in the answer template that receives the retrieved chunks.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// A finite, non-restartable stream of answer fragments in generation order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A fully assembled request for the generation capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// System instructions (template text, context already substituted).
    pub system: String,
    /// Prior turns, oldest first.
    pub history: Vec<Message>,
    /// The current user utterance.
    pub input: String,
}

/// Instruction text loaded from a prompt file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// A template that must carry the [`CONTEXT_PLACEHOLDER`].
    pub fn with_context_slot(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if !text.contains(CONTEXT_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "answer prompt must contain the {} placeholder",
                CONTEXT_PLACEHOLDER
            )));
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Build a prompt with the template text as-is.
    pub fn prompt(&self, history: &[Message], input: &str) -> Prompt {
        Prompt {
            system: self.text.clone(),
            history: history.to_vec(),
            input: input.to_string(),
        }
    }

    /// Build a prompt with `context` substituted for the placeholder.
    pub fn prompt_with_context(&self, context: &str, history: &[Message], input: &str) -> Prompt {
        Prompt {
            system: self.text.replace(CONTEXT_PLACEHOLDER, context),
            history: history.to_vec(),
            input: input.to_string(),
        }
    }
}

/// Opaque text generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-1.5-flash"`).
    fn model_name(&self) -> &str;

    /// Produce a complete response in one call (used for query rewriting).
    async fn rewrite(&self, prompt: &Prompt) -> Result<String>;

    /// Start a streamed response. Each item is the next fragment.
    async fn generate(&self, prompt: &Prompt) -> Result<FragmentStream>;
}
