//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only view the document store has of
//! the embedding index, enabling pluggable backends (in-memory, file
//! snapshotted, remote). Implementations must be `Send + Sync`.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Metadata stored next to each vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Name of the owning document.
    pub document: String,
    /// Chunk text, returned with search hits.
    pub text: String,
}

/// One stored chunk: id, vector, and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Abstract vector index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](VectorIndex::insert) | Add one vector (ids are unique) |
/// | [`delete`](VectorIndex::delete) | Remove a set of ids, all or nothing |
/// | [`search`](VectorIndex::search) | Top-k by cosine similarity |
/// | [`get`](VectorIndex::get) | Fetch stored entries by id |
/// | [`documents`](VectorIndex::documents) | Owners of stored entries |
/// | [`flush`](VectorIndex::flush) | Make the current state durable |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert a vector. Fails if `id` is already present.
    async fn insert(&self, id: &str, vector: Vec<f32>, metadata: ChunkMetadata) -> Result<()>;

    /// Remove every id in `ids`. Fails without removing anything if any id
    /// is unknown.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Return the `k` entries most similar to `vector`, best first.
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>>;

    /// Entries for the given ids, in the order requested. Unknown ids are
    /// skipped.
    async fn get(&self, ids: &[String]) -> Result<Vec<IndexEntry>>;

    /// Ids of every entry tagged with `document`, in insertion order.
    async fn ids_for_document(&self, document: &str) -> Result<Vec<String>>;

    /// Distinct document names across all entries, in first-insertion order.
    async fn documents(&self) -> Result<Vec<String>>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize>;

    /// Persist the current state. In-memory backends have nothing to do.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
