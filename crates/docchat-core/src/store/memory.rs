//! In-memory [`VectorIndex`] implementation.
//!
//! Entries live in a `Vec` behind a `parking_lot::RwLock`, kept in
//! insertion order. Search is brute-force cosine similarity over all
//! stored vectors.

use std::cmp::Ordering;
use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};

use super::{ChunkMetadata, IndexEntry, IndexHit, VectorIndex};

/// In-memory vector index.
#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<Vec<IndexEntry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from a previously taken [`snapshot`](Self::snapshot).
    pub fn from_entries(entries: Vec<IndexEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Copy of every entry, in insertion order.
    pub fn snapshot(&self) -> Vec<IndexEntry> {
        self.entries.read().clone()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn insert(&self, id: &str, vector: Vec<f32>, metadata: ChunkMetadata) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.id == id) {
            return Err(Error::Index(format!("duplicate id {}", id)));
        }
        entries.push(IndexEntry {
            id: id.to_string(),
            vector,
            metadata,
        });
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut entries = self.entries.write();
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let missing = {
            let present: HashSet<&str> = entries
                .iter()
                .map(|e| e.id.as_str())
                .filter(|id| wanted.contains(id))
                .collect();
            wanted
                .iter()
                .find(|id| !present.contains(*id))
                .map(|id| id.to_string())
        };
        if let Some(missing) = missing {
            return Err(Error::Index(format!("unknown id {}", missing)));
        }
        entries.retain(|e| !wanted.contains(e.id.as_str()));
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let entries = self.entries.read();
        let mut hits: Vec<IndexHit> = entries
            .iter()
            .map(|e| IndexHit {
                id: e.id.clone(),
                score: cosine_similarity(vector, &e.vector),
                metadata: e.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<IndexEntry>> {
        let entries = self.entries.read();
        Ok(ids
            .iter()
            .filter_map(|id| entries.iter().find(|e| &e.id == id).cloned())
            .collect())
    }

    async fn ids_for_document(&self, document: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| e.metadata.document == document)
            .map(|e| e.id.clone())
            .collect())
    }

    async fn documents(&self) -> Result<Vec<String>> {
        let entries = self.entries.read();
        let mut seen = HashSet::new();
        Ok(entries
            .iter()
            .map(|e| e.metadata.document.as_str())
            .filter(|doc| seen.insert(*doc))
            .map(str::to_string)
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(doc: &str, text: &str) -> ChunkMetadata {
        ChunkMetadata {
            document: doc.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let index = InMemoryIndex::new();
        index.insert("a", vec![1.0, 0.0], meta("d", "east")).await.unwrap();
        index.insert("b", vec![0.0, 1.0], meta("d", "north")).await.unwrap();
        index.insert("c", vec![0.7, 0.7], meta("d", "north-east")).await.unwrap();

        let hits = index.search(&[0.0, 1.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits[1].id, "c");
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let index = InMemoryIndex::new();
        index.insert("a", vec![1.0], meta("d", "x")).await.unwrap();
        assert!(matches!(
            index.insert("a", vec![1.0], meta("d", "y")).await,
            Err(Error::Index(_))
        ));
        assert_eq!(index.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_all_or_nothing() {
        let index = InMemoryIndex::new();
        index.insert("a", vec![1.0], meta("d", "x")).await.unwrap();
        index.insert("b", vec![1.0], meta("d", "y")).await.unwrap();

        let err = index
            .delete(&["a".to_string(), "zzz".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Index(_)));
        assert_eq!(index.len().await.unwrap(), 2);

        index.delete(&["a".to_string()]).await.unwrap();
        assert_eq!(index.ids_for_document("d").await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let index = InMemoryIndex::new();
        index.insert("a", vec![0.5, 0.5], meta("d1", "x")).await.unwrap();
        index.insert("b", vec![0.1, 0.9], meta("d2", "y")).await.unwrap();

        let got = index.get(&["b".to_string(), "nope".to_string()]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].metadata.text, "y");

        let restored = InMemoryIndex::from_entries(index.snapshot());
        assert_eq!(restored.snapshot(), index.snapshot());
        assert_eq!(restored.ids_for_document("d2").await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_documents_are_distinct_in_insertion_order() {
        let index = InMemoryIndex::new();
        index.insert("a", vec![1.0], meta("d2", "x")).await.unwrap();
        index.insert("b", vec![1.0], meta("d1", "y")).await.unwrap();
        index.insert("c", vec![1.0], meta("d2", "z")).await.unwrap();
        assert_eq!(index.documents().await.unwrap(), vec!["d2", "d1"]);
    }
}
