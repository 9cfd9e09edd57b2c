//! Retrieval Augmented Generation (RAG) over ingested documents.
//!
//! This module implements the whole pipeline, from loaded documents to a
//! grounded answer.
//!
//! # Architecture
//!
//! - [`chunker`]: splits document text into overlapping character windows
//! - [`embedder`]: turns text into vectors through a [`Provider`]
//! - [`store`]: the [`VectorIndex`] trait, backed by LanceDB or memory
//! - [`retriever`]: embeds a question and finds the closest chunks
//! - [`composer`]: builds the grounded prompt and generates the answer
//! - [`RagEngine`]: ties the above into the ingestion and query pipelines
//!
//! # How It Works
//!
//! 1. **Ingestion** (write-only):
//!    - Every document is split into chunks (default: 1500 chars, 200 overlap)
//!    - All chunks are embedded in batches
//!    - The entries are written to the index in a single `add`
//!
//! 2. **Query** (read-only):
//!    - The question is embedded with the same model
//!    - The index returns the top-k most similar chunks
//!    - The chunks, in ranked order, become the `CONTEXT` of one generation call

pub mod chunker;
pub mod composer;
pub mod embedder;
mod lancedb_store;
mod memory_store;
pub mod retriever;
pub mod store;
mod types;

pub use chunker::Chunker;
pub use composer::AnswerComposer;
pub use embedder::{Embedder, EmbedderError, EmbeddingGateway};
pub use lancedb_store::LanceDbIndex;
pub use memory_store::MemoryIndex;
pub use retriever::Retriever;
pub use store::{open_vector_index, IndexError, VectorIndex};
pub use types::{Chunk, Document, IndexEntry, SearchResult};

use crate::config::Config;
use crate::provider::{Provider, ProviderError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid chunking: overlap {overlap} must be smaller than a positive chunk size (got {size})")]
    InvalidChunking { size: usize, overlap: usize },

    #[error("top_k must be at least 1")]
    InvalidTopK,

    #[error("no documents to ingest")]
    NoDocuments,

    #[error("embedding model unavailable: {0}")]
    EmbeddingUnavailable(#[from] EmbedderError),

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(#[from] IndexError),

    #[error("generation model unavailable: {0}")]
    GenerationUnavailable(#[source] ProviderError),
}

impl RagError {
    /// True for errors caused by the caller's input or settings rather than
    /// by a model or the index being unavailable.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RagError::InvalidChunking { .. } | RagError::InvalidTopK | RagError::NoDocuments
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

/// The RAG engine orchestrating all components.
///
/// The engine owns one handle per model and the vector index, built once and
/// shared by every call. Ingestion only writes to the index and querying only
/// reads from it.
///
/// # Thread Safety
///
/// The engine is `Clone`; clones share the same index and provider.
///
/// # Configuration
///
/// The engine uses configuration from [`Config`]:
/// - `rag.embedding_model`, `rag.embed_batch_size`: embedding calls
/// - `rag.chunk_size`, `rag.chunk_overlap`: chunking, in characters
/// - `rag.prompt`: wording of the grounding instruction
/// - `llm.model`, `llm.temperature`: answer generation
/// - `storage`: where the index lives
#[derive(Clone)]
pub struct RagEngine {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingGateway>,
    index: Arc<dyn VectorIndex>,
    retriever: Retriever,
    composer: AnswerComposer,
}

impl RagEngine {
    /// Creates an engine from configuration, opening the configured index.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use pagewise_core::{Config, rag::RagEngine, provider::OllamaProvider};
    /// # use std::sync::Arc;
    /// # async fn example() {
    /// let config = Config::default();
    /// let provider = Arc::new(OllamaProvider::new(&config.llm).unwrap());
    /// let engine = RagEngine::new(&config, provider).await.unwrap();
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidChunking`] for unusable chunk settings
    /// - [`RagError::IndexUnavailable`] if the persisted index cannot be opened
    pub async fn new(config: &Config, provider: Arc<dyn Provider>) -> Result<Self> {
        let chunker = Chunker::new(config.rag.chunk_size, config.rag.chunk_overlap)?;

        let embedder = Embedder::new(provider.clone(), config.rag.embedding_model.clone())
            .with_batch_size(config.rag.embed_batch_size);

        let index = open_vector_index(&config.storage).await?;

        let composer = AnswerComposer::new(provider, config.llm.model.clone())
            .with_temperature(config.llm.temperature)
            .with_prompt(config.rag.prompt.clone());

        info!(
            embedding_model = %config.rag.embedding_model,
            generation_model = %config.llm.model,
            storage = ?config.storage.mode,
            "RAG engine ready"
        );

        Ok(Self::from_parts(chunker, Arc::new(embedder), index, composer))
    }

    /// Assembles an engine from already-built components.
    pub fn from_parts(
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingGateway>,
        index: Arc<dyn VectorIndex>,
        composer: AnswerComposer,
    ) -> Self {
        let retriever = Retriever::new(embedder.clone(), index.clone());
        Self {
            chunker,
            embedder,
            index,
            retriever,
            composer,
        }
    }

    /// Chunks, embeds and indexes `documents`, returning the number of chunks written.
    ///
    /// Chunks of all documents are embedded first and written with a single
    /// `add`, so a failed embedding call leaves the index untouched. Documents
    /// with empty text contribute no chunks.
    ///
    /// # Errors
    ///
    /// - [`RagError::NoDocuments`] if `documents` is empty, before any model call
    /// - [`RagError::EmbeddingUnavailable`] if any chunk cannot be embedded
    /// - [`RagError::IndexUnavailable`] if the entries cannot be written
    pub async fn ingest(&self, documents: &[Document]) -> Result<usize> {
        let entries = self.prepare(documents).await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let added = self.index.add(entries).await?;
        info!(added, "Ingestion complete");
        Ok(added)
    }

    /// Replaces the whole index with the chunks of `documents`.
    ///
    /// Everything is embedded before the index is cleared, so an embedding
    /// failure keeps the previous entries.
    ///
    /// # Errors
    ///
    /// Same as [`RagEngine::ingest`].
    pub async fn replace(&self, documents: &[Document]) -> Result<usize> {
        let entries = self.prepare(documents).await?;

        self.index.clear().await?;
        info!("Index cleared");
        if entries.is_empty() {
            return Ok(0);
        }

        let added = self.index.add(entries).await?;
        info!(added, "Index replaced");
        Ok(added)
    }

    /// Chunks and embeds `documents` without touching the index.
    async fn prepare(&self, documents: &[Document]) -> Result<Vec<IndexEntry>> {
        if documents.is_empty() {
            return Err(RagError::NoDocuments);
        }

        let mut chunks = Vec::new();
        for document in documents {
            let document_chunks = self.chunker.split_document(document);
            if document_chunks.is_empty() {
                warn!(document = %document.id, "Skipping document with no text");
                continue;
            }
            chunks.extend(document_chunks);
        }

        if chunks.is_empty() {
            warn!(documents = documents.len(), "No text to ingest");
            return Ok(Vec::new());
        }

        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            model = %self.embedder.model(),
            "Embedding chunks"
        );

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let vectors = self.embedder.embed(&texts).await.map_err(|e| {
            error!(error = %e, "Embedding failed, nothing was written");
            e
        })?;

        let model = self.embedder.model().to_string();
        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(mut chunk, vector)| {
                chunk.metadata.insert("embedding_model".to_string(), model.clone());
                IndexEntry::new(chunk, vector)
            })
            .collect())
    }

    /// Returns the `top_k` chunks most similar to `question`, without generating.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        self.retriever.retrieve(question, top_k).await
    }

    /// Answers `question` from the `top_k` most similar chunks.
    ///
    /// An empty index still produces an answer, generated over an empty
    /// context. A retrieval failure is returned as-is: the model is never
    /// asked without context.
    pub async fn query(&self, question: &str, top_k: usize) -> Result<String> {
        let results = self.retrieve(question, top_k).await?;
        info!(top_k, retrieved = results.len(), "Composing answer");

        let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        self.composer.compose(question, &contents).await
    }

    /// Number of entries currently stored.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.index.count().await?)
    }

    /// Removes every stored entry.
    pub async fn reset(&self) -> Result<()> {
        self.index.clear().await?;
        info!("Index cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors() {
        assert!(RagError::InvalidTopK.is_configuration());
        assert!(RagError::NoDocuments.is_configuration());
        assert!(RagError::InvalidChunking { size: 1, overlap: 1 }.is_configuration());
        let unavailable = RagError::GenerationUnavailable(ProviderError::Api("down".into()));
        assert!(!unavailable.is_configuration());
    }

    #[tokio::test]
    async fn test_new_rejects_bad_chunking() {
        let mut config = Config::default();
        config.rag.chunk_overlap = config.rag.chunk_size;
        config.storage.mode = crate::config::StorageMode::Memory;

        let provider = Arc::new(crate::provider::OllamaProvider::new(&config.llm).unwrap());
        let result = RagEngine::new(&config, provider).await;
        assert!(matches!(result, Err(RagError::InvalidChunking { .. })));
    }
}
