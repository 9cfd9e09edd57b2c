//! pagewise-core - question answering over local document collections
//!
//! Provides the building blocks of a retrieval-augmented generation pipeline:
//! - Document loaders (PDF via `pdftotext`, plain text, web pages)
//! - RAG core: chunking, embeddings, vector index, retrieval, grounded answers
//! - Ollama provider and availability probe
//! - Configuration management
//!
//! ## Primary API
//!
//! Most users build a [`RagEngine`] from a [`Config`] and call
//! [`RagEngine::ingest`] and [`RagEngine::query`].

pub mod config;
pub mod detection;
pub mod loader;
pub mod provider;
pub mod rag;
pub mod web;

pub use config::Config;
pub use detection::{probe_ollama, DetectionError, OllamaInfo};
pub use loader::{collect_sources, load_documents, DocumentLoader, LoadError};
pub use provider::{OllamaProvider, Provider, ProviderError};
pub use rag::{Document, RagEngine, RagError, SearchResult};
pub use web::{DomainAllowlist, ScrapeResult, WebError, WebScraper};
