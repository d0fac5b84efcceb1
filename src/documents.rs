//! Document store: the vector index plus the document → chunk-id manifest.
//!
//! The two are kept in lockstep. A document name present in the manifest
//! owns exactly the index entries tagged with that name, and no entry in
//! either structure is orphaned. A store opened after an interrupted
//! commit repairs whichever side is ahead.
//!
//! # Concurrency
//!
//! One `tokio::sync::RwLock` guards the manifest and, by convention, the
//! index. [`add`](DocumentStore::add) and [`delete`](DocumentStore::delete)
//! hold the write half for the whole call, including every embedding and
//! index sub-operation. [`similarity_search`](DocumentStore::similarity_search)
//! takes the read half, so searches run concurrently with each other but
//! never observe a half-added or half-deleted document.
//!
//! # Atomicity
//!
//! Every mutation stages its work, applies it to the index, then commits
//! by flushing the index and writing the manifest file. Any failure along
//! the way (embedding, index, or disk) undoes what was applied so the
//! store is exactly as it was before the call.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docchat_core::embedding::EmbeddingProvider;
use docchat_core::models::RetrievedChunk;
use docchat_core::store::{ChunkMetadata, IndexEntry, VectorIndex};
use docchat_core::{Error, Result};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::persist;

/// Document name → ordered chunk ids.
pub type Manifest = BTreeMap<String, Vec<String>>;

/// Summary row for listing documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub name: String,
    pub chunks: usize,
}

pub struct DocumentStore {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    manifest: RwLock<Manifest>,
    /// `None` keeps the manifest in memory only.
    manifest_path: Option<PathBuf>,
}

impl DocumentStore {
    /// A store whose manifest lives only in memory.
    pub fn in_memory(index: Arc<dyn VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            embedder,
            manifest: RwLock::new(Manifest::new()),
            manifest_path: None,
        }
    }

    /// Open a store backed by the manifest file at `manifest_path`.
    ///
    /// A missing manifest file is treated as an empty collection. If the
    /// manifest and the index disagree (a commit was interrupted between
    /// its two writes) they are reconciled before the store is returned.
    pub async fn open(
        manifest_path: &Path,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let manifest: Manifest = persist::read_json(manifest_path)
            .await?
            .unwrap_or_default();
        let store = Self {
            index,
            embedder,
            manifest: RwLock::new(manifest),
            manifest_path: Some(manifest_path.to_path_buf()),
        };
        store.reconcile().await?;
        Ok(store)
    }

    /// Make the manifest and the index agree again.
    ///
    /// Manifest ids absent from the index are dropped, and a document that
    /// loses every listed id is dropped with them. Index entries not listed
    /// under their document in the manifest are deleted. Nothing is written
    /// when the two already agree.
    async fn reconcile(&self) -> Result<()> {
        let mut manifest = self.manifest.write().await;
        let mut dropped_ids = 0usize;
        let mut emptied: Vec<String> = Vec::new();
        let mut orphans: Vec<String> = Vec::new();

        for (name, ids) in manifest.iter_mut() {
            let stored = self.index.ids_for_document(name).await?;
            let present: HashSet<&str> = stored.iter().map(String::as_str).collect();
            let listed = ids.len();
            ids.retain(|id| present.contains(id.as_str()));
            dropped_ids += listed - ids.len();
            if listed > 0 && ids.is_empty() {
                emptied.push(name.clone());
            }
            let owned: HashSet<&str> = ids.iter().map(String::as_str).collect();
            orphans.extend(
                stored
                    .iter()
                    .filter(|id| !owned.contains(id.as_str()))
                    .cloned(),
            );
        }
        for name in &emptied {
            manifest.remove(name);
        }
        for document in self.index.documents().await? {
            if !manifest.contains_key(&document) {
                orphans.extend(self.index.ids_for_document(&document).await?);
            }
        }

        if dropped_ids == 0 && emptied.is_empty() && orphans.is_empty() {
            return Ok(());
        }
        warn!(
            missing_ids = dropped_ids,
            dropped_documents = emptied.len(),
            orphaned_entries = orphans.len(),
            "manifest and vector index disagree; reconciling"
        );
        if !orphans.is_empty() {
            self.index.delete(&orphans).await?;
        }
        self.commit(&manifest).await
    }

    /// Embed and store `chunks` as document `name`, returning their ids.
    ///
    /// Fails with [`Error::DuplicateDocument`] if `name` is already stored.
    /// On any failure the manifest and index are left exactly as before.
    pub async fn add(&self, name: &str, chunks: &[String]) -> Result<Vec<String>> {
        let mut manifest = self.manifest.write().await;
        if manifest.contains_key(name) {
            return Err(Error::DuplicateDocument(name.to_string()));
        }

        // Stage: embed everything before touching the index.
        let vectors = if chunks.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(chunks).await?
        };
        if vectors.len() != chunks.len() {
            return Err(Error::Generation(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let ids: Vec<String> = chunks.iter().map(|_| Uuid::new_v4().to_string()).collect();

        let mut inserted: Vec<String> = Vec::with_capacity(ids.len());
        for ((id, text), vector) in ids.iter().zip(chunks).zip(vectors) {
            let metadata = ChunkMetadata {
                document: name.to_string(),
                text: text.clone(),
            };
            if let Err(e) = self.index.insert(id, vector, metadata).await {
                self.undo_inserts(&inserted).await;
                return Err(e);
            }
            inserted.push(id.clone());
        }

        manifest.insert(name.to_string(), ids.clone());
        if let Err(e) = self.commit(&manifest).await {
            manifest.remove(name);
            self.undo_inserts(&inserted).await;
            self.best_effort_flush().await;
            return Err(e);
        }

        info!(document = name, chunks = ids.len(), "document added");
        Ok(ids)
    }

    /// Remove each named document and all of its chunks.
    ///
    /// Every name is checked first: an unknown name fails the whole call
    /// with [`Error::UnknownDocument`] and nothing is removed. If the index
    /// or disk fails partway, documents already removed in this call are
    /// restored.
    pub async fn delete(&self, names: &[String]) -> Result<()> {
        let mut manifest = self.manifest.write().await;
        if let Some(unknown) = names.iter().find(|n| !manifest.contains_key(n.as_str())) {
            return Err(Error::UnknownDocument(unknown.clone()));
        }

        let mut removed: Vec<(String, Vec<String>, Vec<IndexEntry>)> = Vec::new();
        for name in names {
            // A name listed twice was already handled.
            let Some(ids) = manifest.get(name).cloned() else {
                continue;
            };
            let entries = match self.index.get(&ids).await {
                Ok(entries) => entries,
                Err(e) => {
                    self.undo_deletes(&mut manifest, removed).await;
                    return Err(e);
                }
            };
            if let Err(e) = self.index.delete(&ids).await {
                self.undo_deletes(&mut manifest, removed).await;
                return Err(e);
            }
            manifest.remove(name);
            removed.push((name.clone(), ids, entries));
        }

        if let Err(e) = self.commit(&manifest).await {
            self.undo_deletes(&mut manifest, removed).await;
            self.best_effort_flush().await;
            return Err(e);
        }

        for (name, ids, _) in &removed {
            info!(document = %name, chunks = ids.len(), "document deleted");
        }
        Ok(())
    }

    /// Rank stored chunks against `query_vector`. Read-only.
    pub async fn similarity_search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let _guard = self.manifest.read().await;
        let hits = self.index.search(query_vector, k).await?;
        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                chunk_id: hit.id,
                document: hit.metadata.document,
                text: hit.metadata.text,
                score: hit.score,
            })
            .collect())
    }

    /// Documents in name order with their chunk counts.
    pub async fn list(&self) -> Vec<DocumentInfo> {
        self.manifest
            .read()
            .await
            .iter()
            .map(|(name, ids)| DocumentInfo {
                name: name.clone(),
                chunks: ids.len(),
            })
            .collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.manifest.read().await.contains_key(name)
    }

    /// Copy of the current manifest.
    pub async fn manifest(&self) -> Manifest {
        self.manifest.read().await.clone()
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    async fn commit(&self, manifest: &Manifest) -> Result<()> {
        self.index.flush().await?;
        if let Some(path) = &self.manifest_path {
            persist::write_json(path, manifest).await?;
        }
        Ok(())
    }

    async fn undo_inserts(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.index.delete(ids).await {
            error!(error = %e, "failed to roll back inserted chunks");
        }
    }

    async fn undo_deletes(
        &self,
        manifest: &mut Manifest,
        removed: Vec<(String, Vec<String>, Vec<IndexEntry>)>,
    ) {
        for (name, ids, entries) in removed.into_iter().rev() {
            for entry in entries {
                if let Err(e) = self
                    .index
                    .insert(&entry.id, entry.vector, entry.metadata)
                    .await
                {
                    error!(document = %name, error = %e, "failed to restore chunk");
                }
            }
            manifest.insert(name, ids);
        }
    }

    async fn best_effort_flush(&self) {
        if let Err(e) = self.index.flush().await {
            error!(error = %e, "failed to flush vector index after rollback");
        }
    }
}
