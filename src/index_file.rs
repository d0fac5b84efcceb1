//! File-snapshotted vector index.
//!
//! Wraps the core [`InMemoryIndex`] and writes its full content to
//! `<dir>/index.json` on every [`flush`](VectorIndex::flush), using the
//! same atomic temp-file + rename as the other backing files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use docchat_core::store::memory::InMemoryIndex;
use docchat_core::store::{ChunkMetadata, IndexEntry, IndexHit, VectorIndex};
use docchat_core::Result;
use tracing::debug;

use crate::persist;

const INDEX_FILE_NAME: &str = "index.json";

pub struct FileIndex {
    inner: InMemoryIndex,
    path: PathBuf,
}

impl FileIndex {
    /// Load the snapshot in `dir`, or start empty if there is none yet.
    pub async fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(INDEX_FILE_NAME);
        let entries: Vec<IndexEntry> = persist::read_json(&path).await?.unwrap_or_default();
        debug!(path = %path.display(), entries = entries.len(), "opened vector index");
        Ok(Self {
            inner: InMemoryIndex::from_entries(entries),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl VectorIndex for FileIndex {
    async fn insert(&self, id: &str, vector: Vec<f32>, metadata: ChunkMetadata) -> Result<()> {
        self.inner.insert(id, vector, metadata).await
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.inner.delete(ids).await
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        self.inner.search(vector, k).await
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<IndexEntry>> {
        self.inner.get(ids).await
    }

    async fn ids_for_document(&self, document: &str) -> Result<Vec<String>> {
        self.inner.ids_for_document(document).await
    }

    async fn documents(&self) -> Result<Vec<String>> {
        self.inner.documents().await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }

    async fn flush(&self) -> Result<()> {
        persist::write_json(&self.path, &self.inner.snapshot()).await
    }
}
