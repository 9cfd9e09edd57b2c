//! In-memory vector index using cosine similarity.
//!
//! Backed by a `Vec` behind a `tokio::sync::RwLock`, so insertion order is
//! the storage order. Used for tests and for `storage.mode: memory`.

use super::store::{batch_dimension, cosine_similarity, IndexError, Result, VectorIndex};
use super::types::{IndexEntry, SearchResult};
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: RwLock<Vec<IndexEntry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<usize> {
        let mut stored = self.entries.write().await;
        let existing = stored.first().map(|e| e.vector.len());
        batch_dimension(&entries, existing)?;

        let added = entries.len();
        stored.extend(entries);
        Ok(added)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let stored = self.entries.read().await;
        if let Some(first) = stored.first() {
            if first.vector.len() != query.len() {
                return Err(IndexError::DimensionMismatch {
                    expected: first.vector.len(),
                    actual: query.len(),
                });
            }
        }

        let mut scored: Vec<SearchResult> = stored
            .iter()
            .map(|entry| SearchResult {
                content: entry.content.clone(),
                metadata: entry.metadata.clone(),
                score: cosine_similarity(&entry.vector, query),
            })
            .collect();

        // sort_by is stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}
