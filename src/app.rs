//! Component wiring.
//!
//! Builds the document store and the chat pipeline from a validated
//! [`Config`]. Providers are injected through [`ChatServices::new`] so the
//! same wiring runs against fakes in tests.

use std::sync::Arc;

use anyhow::{Context, Result};
use docchat_core::embedding::EmbeddingProvider;
use docchat_core::generation::Generator;

use crate::answer::AnswerGenerator;
use crate::config::Config;
use crate::documents::DocumentStore;
use crate::embedding::create_provider;
use crate::generation::create_generator;
use crate::index_file::FileIndex;
use crate::memory::ConversationMemory;
use crate::orchestrator::SessionOrchestrator;
use crate::retriever::HistoryAwareRetriever;

/// Embedding provider for ingestion (needs only the embedding key).
pub fn embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let key = config.embedding_credential()?;
    create_provider(&config.embedding, key)
}

/// Open the persisted document store.
pub async fn open_store(
    config: &Config,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<DocumentStore>> {
    let index = FileIndex::open(&config.paths.index)
        .await
        .with_context(|| format!("Failed to open index in {}", config.paths.index.display()))?;
    let store = DocumentStore::open(&config.paths.manifest, Arc::new(index), embedder)
        .await
        .with_context(|| {
            format!(
                "Failed to open manifest {}",
                config.paths.manifest.display()
            )
        })?;
    Ok(Arc::new(store))
}

/// Shared, session-independent parts of the chat pipeline.
pub struct ChatServices {
    pub store: Arc<DocumentStore>,
    pub retriever: Arc<HistoryAwareRetriever>,
    pub answerer: Arc<AnswerGenerator>,
}

impl ChatServices {
    pub fn new(
        config: &Config,
        store: Arc<DocumentStore>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let retriever = HistoryAwareRetriever::new(
            generator.clone(),
            store.embedder().clone(),
            store.clone(),
            config.rewrite_template()?,
            config.retrieval.top_k,
        );
        let answerer = AnswerGenerator::new(generator, config.answer_template()?);
        Ok(Self {
            store,
            retriever: Arc::new(retriever),
            answerer: Arc::new(answerer),
        })
    }

    /// Production wiring. Fails with `MissingCredential` unless both keys
    /// are present.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let credentials = config.chat_credentials()?;
        let embedder = create_provider(&config.embedding, credentials.embedding)?;
        let generator = create_generator(&config.generation, credentials.generation)?;
        let store = open_store(config, embedder).await?;
        Self::new(config, store, generator)
    }

    /// Orchestrator for one session, taking ownership of its memory.
    pub fn orchestrator(&self, session_id: &str, memory: ConversationMemory) -> SessionOrchestrator {
        SessionOrchestrator::new(
            session_id,
            memory,
            self.retriever.clone(),
            self.answerer.clone(),
        )
    }
}
