//! Vector index abstraction and factory.
//!
//! This module provides a unified interface for the vector index backends.

use super::lancedb_store::LanceDbIndex;
use super::memory_store::MemoryIndex;
use super::types::{IndexEntry, SearchResult};
use crate::config::{StorageConfig, StorageMode};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a vector index backend.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The persisted index could not be opened (corrupt, permission denied, ...).
    #[error("failed to open index: {0:#}")]
    Open(#[source] anyhow::Error),

    #[error("failed to write to index: {0:#}")]
    Write(#[source] anyhow::Error),

    #[error("failed to query index: {0:#}")]
    Query(#[source] anyhow::Error),

    /// A vector does not match the dimension the index was created with.
    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Unified interface for vector index operations.
///
/// Entries are append-only: `add` never replaces an existing entry, so adding
/// the same chunk twice stores it twice. Similarity is cosine similarity for
/// every backend, and results with equal scores come back in insertion order.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Appends entries, returning how many were added.
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<usize>;

    /// Searches for the `k` most similar entries.
    ///
    /// # Returns
    ///
    /// At most `k` results sorted by descending similarity score. An empty
    /// index yields an empty vector.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Returns the total number of entries in the index.
    async fn count(&self) -> Result<usize>;

    /// Removes every entry.
    async fn clear(&self) -> Result<()>;
}

/// Creates a vector index for the configured storage mode.
///
/// - `Embedded` opens (or lazily creates) a LanceDB table under `path`
/// - `Memory` returns an empty process-local index
pub async fn open_vector_index(storage_config: &StorageConfig) -> Result<Arc<dyn VectorIndex>> {
    match storage_config.mode {
        StorageMode::Embedded => {
            let index = LanceDbIndex::open(&storage_config.path, &storage_config.table).await?;
            Ok(Arc::new(index))
        }
        StorageMode::Memory => Ok(Arc::new(MemoryIndex::new())),
    }
}

/// Cosine similarity of two vectors, `0.0` when either has zero magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Dimension shared by every entry, checked against the index's own if it has one.
pub(crate) fn batch_dimension(
    entries: &[IndexEntry],
    existing: Option<usize>,
) -> Result<Option<usize>> {
    let mut dimension = existing;
    for entry in entries {
        match dimension {
            Some(expected) if expected != entry.vector.len() => {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: entry.vector.len(),
                });
            }
            Some(_) => {}
            None => dimension = Some(entry.vector.len()),
        }
    }
    Ok(dimension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            content: String::new(),
            vector,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_batch_dimension() {
        let entries = vec![entry(vec![1.0, 2.0]), entry(vec![3.0, 4.0])];
        assert_eq!(batch_dimension(&entries, None).unwrap(), Some(2));
        assert_eq!(batch_dimension(&[], None).unwrap(), None);
        assert!(matches!(
            batch_dimension(&entries, Some(3)),
            Err(IndexError::DimensionMismatch { expected: 3, actual: 2 })
        ));

        let ragged = vec![entry(vec![1.0]), entry(vec![1.0, 2.0])];
        assert!(batch_dimension(&ragged, None).is_err());
    }

    #[tokio::test]
    async fn test_open_memory_index() {
        let config = StorageConfig {
            mode: StorageMode::Memory,
            ..StorageConfig::default()
        };
        let index = open_vector_index(&config).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
