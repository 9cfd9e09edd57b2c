//! Embedding generation using model providers.
//!
//! This module provides functionality to convert text into vector embeddings
//! using provider embedding models.

use crate::provider::{Provider, ProviderError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during embedding generation.
#[derive(Debug, Error)]
pub enum EmbedderError {
    /// The provider could not be reached or returned an error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The provider answered a batch with the wrong number of vectors.
    #[error("expected {expected} embeddings, received {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// An embedding came back with no values at all.
    #[error("received an empty embedding")]
    EmptyVector,

    /// Embeddings from the same model disagreed on their dimension.
    #[error("embedding dimension changed from {expected} to {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An embedding contained NaN or infinity.
    #[error("embedding contains non-finite values")]
    NonFinite,
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedderError>;

/// Converts text into embedding vectors.
///
/// Every vector produced by one gateway comes from the same model and has the
/// same dimension, so vectors can be compared with each other.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Embeds each text, returning one vector per input in input order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single text, typically a query.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text]).await?;
        vectors.pop().ok_or(EmbedderError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    /// Name of the embedding model.
    fn model(&self) -> &str;
}

/// Generates vector embeddings for text using a provider embedding model.
///
/// The embedder converts text into high-dimensional vectors that capture
/// semantic meaning. Inputs are sent in batches of `batch_size`, and every
/// response is checked before being handed back: a short batch, an empty or
/// non-finite vector, or a change of dimension is an error rather than
/// something to paper over.
///
/// # Supported Models
///
/// Common Ollama embedding models:
/// - `embeddinggemma` - 768-dimensional embeddings, the default
/// - `nomic-embed-text` - 768-dimensional embeddings, good general purpose
/// - `mxbai-embed-large` - 1024-dimensional embeddings, higher quality
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn Provider>,
    model: String,
    batch_size: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            batch_size: 32,
        }
    }

    /// Sets how many texts go into one provider call. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[async_trait]
impl EmbeddingGateway for Embedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        let mut dimension = None;

        for batch in texts.chunks(self.batch_size) {
            let inputs: Vec<String> = batch.iter().map(|t| t.to_string()).collect();
            debug!(model = %self.model, batch = inputs.len(), "Embedding batch");

            let embeddings = self.provider.embed(&inputs, &self.model).await?;
            if embeddings.len() != batch.len() {
                return Err(EmbedderError::CountMismatch {
                    expected: batch.len(),
                    actual: embeddings.len(),
                });
            }

            for embedding in embeddings {
                check_vector(&embedding, &mut dimension)?;
                vectors.push(embedding);
            }
        }

        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn check_vector(vector: &[f32], dimension: &mut Option<usize>) -> Result<()> {
    if vector.is_empty() {
        return Err(EmbedderError::EmptyVector);
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(EmbedderError::NonFinite);
    }
    match *dimension {
        Some(expected) if expected != vector.len() => Err(EmbedderError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        Some(_) => Ok(()),
        None => {
            *dimension = Some(vector.len());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GenerateRequest;
    use std::sync::Mutex;

    /// Returns canned vectors and records the batch sizes it was called with.
    struct ScriptedProvider {
        make: fn(&str) -> Vec<f32>,
        drop_last: bool,
        calls: Mutex<Vec<usize>>,
    }

    impl ScriptedProvider {
        fn new(make: fn(&str) -> Vec<f32>) -> Self {
            Self {
                make,
                drop_last: false,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn embed(
            &self,
            texts: &[String],
            _model: &str,
        ) -> crate::provider::Result<Vec<Vec<f32>>> {
            self.calls.lock().unwrap().push(texts.len());
            let mut out: Vec<Vec<f32>> = texts.iter().map(|t| (self.make)(t)).collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }

        async fn generate(&self, _request: GenerateRequest) -> crate::provider::Result<String> {
            Err(ProviderError::Other("not a generator".into()))
        }
    }

    fn by_length(text: &str) -> Vec<f32> {
        vec![text.len() as f32, 1.0]
    }

    #[tokio::test]
    async fn test_embed_preserves_order_across_batches() {
        let provider = Arc::new(ScriptedProvider::new(by_length));
        let embedder = Embedder::new(provider.clone(), "test-model").with_batch_size(2);

        let vectors = embedder.embed(&["a", "bb", "ccc", "dddd", "eeeee"]).await.unwrap();
        let firsts: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(firsts, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(*provider.calls.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_embed_one() {
        let embedder = Embedder::new(Arc::new(ScriptedProvider::new(by_length)), "m");
        assert_eq!(embedder.embed_one("abc").await.unwrap(), vec![3.0, 1.0]);
    }

    #[tokio::test]
    async fn test_short_batch_is_rejected() {
        let mut provider = ScriptedProvider::new(by_length);
        provider.drop_last = true;
        let embedder = Embedder::new(Arc::new(provider), "m");

        let err = embedder.embed(&["a", "b"]).await.unwrap_err();
        assert!(matches!(err, EmbedderError::CountMismatch { expected: 2, actual: 1 }));
    }

    #[tokio::test]
    async fn test_changing_dimension_is_rejected() {
        fn ragged(text: &str) -> Vec<f32> {
            vec![1.0; text.len()]
        }
        let embedder = Embedder::new(Arc::new(ScriptedProvider::new(ragged)), "m");
        let err = embedder.embed(&["a", "bb"]).await.unwrap_err();
        assert!(matches!(err, EmbedderError::DimensionMismatch { expected: 1, actual: 2 }));
    }

    #[tokio::test]
    async fn test_empty_and_nan_vectors_are_rejected() {
        fn empty(_: &str) -> Vec<f32> {
            Vec::new()
        }
        fn nan(_: &str) -> Vec<f32> {
            vec![f32::NAN, 0.5]
        }
        let embedder = Embedder::new(Arc::new(ScriptedProvider::new(empty)), "m");
        assert!(matches!(embedder.embed_one("x").await, Err(EmbedderError::EmptyVector)));

        let embedder = Embedder::new(Arc::new(ScriptedProvider::new(nan)), "m");
        assert!(matches!(embedder.embed_one("x").await, Err(EmbedderError::NonFinite)));
    }
}
