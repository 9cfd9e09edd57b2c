//! Question-to-passages retrieval.

use super::embedder::EmbeddingGateway;
use super::store::VectorIndex;
use super::types::SearchResult;
use super::{RagError, Result};
use std::sync::Arc;
use tracing::debug;

/// Embeds a question and looks up the most similar indexed chunks.
///
/// Results are returned exactly as the index ranked them: no re-ranking,
/// no score threshold.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingGateway>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingGateway>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Returns up to `top_k` chunks ordered by descending similarity.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidTopK`] if `top_k` is zero
    /// - [`RagError::EmbeddingUnavailable`] if the question cannot be embedded
    /// - [`RagError::IndexUnavailable`] if the index cannot be searched
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(RagError::InvalidTopK);
        }

        let vector = self.embedder.embed_one(question).await?;
        let results = self.index.search(&vector, top_k).await?;

        debug!(
            top_k,
            found = results.len(),
            best = results.first().map(|r| r.score),
            "Retrieved context"
        );
        Ok(results)
    }
}
