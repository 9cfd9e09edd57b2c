//! Text chunking for RAG.
//!
//! Splits document text into overlapping windows measured in characters
//! (Unicode scalar values, never bytes). For a text of `L` characters split
//! with size `S` and overlap `O`:
//!
//! - `L == 0` produces no chunks, `L <= S` produces the text as one chunk
//! - otherwise exactly `ceil((L - O) / (S - O))` chunks are produced
//! - consecutive chunks share exactly `O` characters
//! - dropping the first `O` characters of every chunk but the first and
//!   concatenating gives back the original text
//!
//! Inside those bounds each cut is moved to the latest paragraph break, then
//! sentence end, then whitespace that still leaves the chunk count unchanged.
//! Only when none exists is a word cut in half.

use super::types::{Chunk, Document};
use super::{RagError, Result};

/// Break candidates, strongest first. A cut lands right after the separator.
const SEPARATORS: [&[&str]; 3] = [
    &["\n\n"],
    &[". ", "! ", "? ", ".\n", "!\n", "?\n"],
    &[" ", "\n", "\t"],
];

/// Splits `text` into overlapping chunks.
///
/// Convenience wrapper over [`Chunker`] for one-off calls.
///
/// # Errors
///
/// Returns [`RagError::InvalidChunking`] if `chunk_size` is zero or
/// `chunk_overlap >= chunk_size`.
pub fn split(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    Ok(Chunker::new(chunk_size, chunk_overlap)?.split(text))
}

/// Number of chunks produced for a text of `len` characters.
pub fn chunk_count(len: usize, chunk_size: usize, chunk_overlap: usize) -> usize {
    if len == 0 {
        0
    } else if len <= chunk_size {
        1
    } else {
        (len - chunk_overlap).div_ceil(chunk_size - chunk_overlap)
    }
}

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Creates a chunker, rejecting parameters that could never make progress.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(RagError::InvalidChunking {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits text into chunks. See the module docs for the guarantees.
    pub fn split(&self, text: &str) -> Vec<String> {
        // Byte offset of every char boundary, end of text included, so that
        // char position `p` maps to `offsets[p]`.
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = offsets.len() - 1;

        if len == 0 {
            return Vec::new();
        }
        if len <= self.chunk_size {
            return vec![text.to_string()];
        }

        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::with_capacity(chunk_count(len, self.chunk_size, self.chunk_overlap));
        let mut start = 0;

        loop {
            let remaining = len - start;
            if remaining <= self.chunk_size {
                chunks.push(text[offsets[start]..].to_string());
                break;
            }

            // Chunks still needed from `start`. Ending this chunk any earlier
            // than `earliest` would leave more text than they can cover.
            let left = chunk_count(remaining, self.chunk_size, self.chunk_overlap);
            let earliest = (len - (left - 1) * step).max(start + self.chunk_overlap + 1);
            let latest = start + self.chunk_size;

            let end = find_break(text, &offsets, earliest, latest);
            chunks.push(text[offsets[start]..offsets[end]].to_string());
            start = end - self.chunk_overlap;
        }

        chunks
    }

    /// Splits a document, copying its metadata onto every chunk.
    ///
    /// Each chunk also records its position under `chunk` and, when the
    /// loader did not set one, the document id under `source`.
    pub fn split_document(&self, document: &Document) -> Vec<Chunk> {
        self.split(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, content)| {
                let mut metadata = document.metadata.clone();
                metadata
                    .entry("source".to_string())
                    .or_insert_with(|| document.id.clone());
                metadata.insert("chunk".to_string(), i.to_string());
                Chunk { content, metadata }
            })
            .collect()
    }
}

/// Latest char position in `lo..=hi` that follows a separator, trying the
/// strongest separators first. Falls back to `hi` (a hard cut).
fn find_break(text: &str, offsets: &[usize], lo: usize, hi: usize) -> usize {
    for tier in SEPARATORS {
        let found = (lo..=hi).rev().find(|&p| {
            let head = &text[..offsets[p]];
            tier.iter().any(|sep| head.ends_with(sep))
        });
        if let Some(p) = found {
            return p;
        }
    }
    hi
}
