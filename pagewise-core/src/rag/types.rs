use std::collections::HashMap;

/// A loaded source document, before chunking.
///
/// Documents come out of a loader (one per PDF page, one per text file, one
/// per scraped web page) and are never modified afterwards. The `id` is the
/// source path, suffixed with the page for paged sources.
///
/// # Example
///
/// ```
/// use pagewise_core::rag::Document;
///
/// let doc = Document::new("docs/guide.pdf#3", "Page text")
///     .with_metadata("source", "docs/guide.pdf")
///     .with_metadata("page", "3");
/// assert_eq!(doc.metadata["page"], "3");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A contiguous piece of a [`Document`]'s text, carrying the document's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub metadata: HashMap<String, String>,
}

/// A chunk together with its embedding, as persisted by a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub content: String,
    pub vector: Vec<f32>,
    pub metadata: HashMap<String, String>,
}

impl IndexEntry {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            content: chunk.content,
            vector,
            metadata: chunk.metadata,
        }
    }
}

/// A retrieved chunk and its similarity to the query.
///
/// Returned by vector search operations, ordered by descending similarity score.
///
/// # Score Range
///
/// Scores are cosine similarities in `[-1.0, 1.0]`:
/// - `1.0` - Same direction (perfect match)
/// - `0.0` - Orthogonal vectors (no similarity)
/// - `-1.0` - Opposite vectors
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub content: String,
    pub metadata: HashMap<String, String>,
    pub score: f32,
}
