//! History-aware retrieval.
//!
//! A follow-up like "and how far is it from Lyon?" is useless as a search
//! query on its own. [`HistoryAwareRetriever`] first asks the generator to
//! rewrite the utterance into a standalone question using the prior turns,
//! then embeds that question and searches the document store.
//!
//! With no prior turns the utterance is used verbatim and the generator is
//! not called at all.

use std::sync::Arc;

use docchat_core::embedding::EmbeddingProvider;
use docchat_core::generation::{Generator, PromptTemplate};
use docchat_core::models::{Message, RetrievedChunk};
use docchat_core::Result;
use tracing::debug;

use crate::documents::DocumentStore;

/// Outcome of one retrieval step.
#[derive(Debug, Clone)]
pub struct Retrieval {
    /// The standalone query actually searched for.
    pub query: String,
    /// Best matches first.
    pub chunks: Vec<RetrievedChunk>,
}

pub struct HistoryAwareRetriever {
    generator: Arc<dyn Generator>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<DocumentStore>,
    template: PromptTemplate,
    top_k: usize,
}

impl HistoryAwareRetriever {
    pub fn new(
        generator: Arc<dyn Generator>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<DocumentStore>,
        template: PromptTemplate,
        top_k: usize,
    ) -> Self {
        Self {
            generator,
            embedder,
            store,
            template,
            top_k,
        }
    }

    /// Standalone form of `utterance` given `history`.
    pub async fn rewrite(&self, history: &[Message], utterance: &str) -> Result<String> {
        if history.is_empty() {
            return Ok(utterance.to_string());
        }
        let prompt = self.template.prompt(history, utterance);
        let query = self.generator.rewrite(&prompt).await?;
        debug!(utterance, query = %query, "rewrote follow-up");
        Ok(query)
    }

    /// Top-k chunks for `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let vector = self.embedder.embed(query).await?;
        self.store.similarity_search(&vector, self.top_k).await
    }

    /// [`rewrite`](Self::rewrite) then [`retrieve`](Self::retrieve).
    pub async fn retrieve_for_turn(&self, history: &[Message], utterance: &str) -> Result<Retrieval> {
        let query = self.rewrite(history, utterance).await?;
        let chunks = self.retrieve(&query).await?;
        debug!(query = %query, hits = chunks.len(), "retrieved context");
        Ok(Retrieval { query, chunks })
    }
}
