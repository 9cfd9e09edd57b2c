//! Document loaders turning files on disk into [`Document`]s.
//!
//! PDFs are converted with poppler's `pdftotext`, one document per page.
//! Plain text and Markdown files become a single document each.

use crate::rag::Document;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{tool}` not found in PATH (install poppler-utils)")]
    ToolMissing { tool: String },

    #[error("Failed to extract text from {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("Unsupported file type: {path}")]
    Unsupported { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, LoadError>;

/// Extensions handled by [`load_documents`].
pub const PDF_EXTENSIONS: &[&str] = &["pdf"];
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Loads the documents contained in one file.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Vec<Document>>;
}

/// Loads PDFs through `pdftotext`, producing one document per non-blank page.
///
/// Each document has the id `<path>#<page>` and the metadata `source`
/// (the file path) and `page` (0-based page number).
#[derive(Debug, Clone)]
pub struct PdfLoader {
    program: String,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self {
            program: "pdftotext".to_string(),
        }
    }
}

impl PdfLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses another `pdftotext`-compatible executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load(&self, path: &Path) -> Result<Vec<Document>> {
        let output = Command::new(&self.program)
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => LoadError::ToolMissing {
                    tool: self.program.clone(),
                },
                _ => LoadError::Io {
                    path: path.to_path_buf(),
                    source: e,
                },
            })?;

        if !output.status.success() {
            return Err(LoadError::Extraction {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let pages = split_pages(&path.display().to_string(), &text);
        debug!(path = %path.display(), pages = pages.len(), "Loaded PDF");
        Ok(pages)
    }
}

/// Splits `pdftotext` output on form feeds, skipping blank pages.
fn split_pages(source: &str, text: &str) -> Vec<Document> {
    text.split('\u{c}')
        .enumerate()
        .filter_map(|(page, page_text)| {
            if page_text.trim().is_empty() {
                // pdftotext ends every page with a form feed, so the last piece is always empty
                if !page_text.is_empty() {
                    warn!(source, page, "Skipping blank page");
                }
                return None;
            }
            Some(
                Document::new(format!("{}#{}", source, page), page_text)
                    .with_metadata("source", source)
                    .with_metadata("page", page.to_string()),
            )
        })
        .collect()
}

/// Loads a UTF-8 text or Markdown file as a single document.
#[derive(Debug, Clone, Default)]
pub struct TextLoader;

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load(&self, path: &Path) -> Result<Vec<Document>> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let source = path.display().to_string();
        Ok(vec![Document::new(&source, text).with_metadata("source", source)])
    }
}

/// Lists the files directly inside `dir` whose extension is in `extensions`.
///
/// The match is case-insensitive and subdirectories are not searched. The
/// result is sorted so ingestion order is stable between runs.
pub async fn collect_sources(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let io_error = |e| LoadError::Io {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    let mut sources = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let path = entry.path();
        if !entry.file_type().await.map_err(io_error)?.is_file() {
            continue;
        }
        if has_extension(&path, extensions) {
            sources.push(path);
        }
    }

    sources.sort();
    Ok(sources)
}

/// Loads every path with the loader matching its extension, in order.
pub async fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let pdf = PdfLoader::new();
    let text = TextLoader;
    let mut documents = Vec::new();

    for path in paths {
        let loaded = if has_extension(path, PDF_EXTENSIONS) {
            pdf.load(path).await?
        } else if has_extension(path, TEXT_EXTENSIONS) {
            text.load(path).await?
        } else {
            return Err(LoadError::Unsupported { path: path.clone() });
        };
        documents.extend(loaded);
    }

    Ok(documents)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_split_pages() {
        let docs = split_pages("manual.pdf", "Intro\n\u{c}\n \n\u{c}Chapter one\n\u{c}");
        assert_eq!(docs.len(), 2);

        assert_eq!(docs[0].id, "manual.pdf#0");
        assert_eq!(docs[0].text, "Intro\n");
        assert_eq!(docs[0].metadata["page"], "0");

        assert_eq!(docs[1].id, "manual.pdf#2");
        assert_eq!(docs[1].metadata["source"], "manual.pdf");
        assert_eq!(docs[1].metadata["page"], "2");
    }

    #[tokio::test]
    async fn test_collect_sources_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.pdf"), b"").unwrap();
        fs::write(dir.path().join("a.PDF"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let sources = collect_sources(dir.path(), PDF_EXTENSIONS).await.unwrap();
        let names: Vec<_> = sources
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[tokio::test]
    async fn test_collect_sources_missing_dir() {
        let dir = TempDir::new().unwrap();
        let result = collect_sources(&dir.path().join("missing"), PDF_EXTENSIONS).await;
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[tokio::test]
    async fn test_text_loader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        fs::write(&path, "# Notes\n\nSome text.").unwrap();

        let docs = load_documents(&[path.clone()]).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "# Notes\n\nSome text.");
        assert_eq!(docs[0].metadata["source"], path.display().to_string());
    }

    #[tokio::test]
    async fn test_missing_pdftotext() {
        let loader = PdfLoader::new().with_program("pdftotext-definitely-not-installed");
        let result = loader.load(Path::new("doc.pdf")).await;
        assert!(matches!(result, Err(LoadError::ToolMissing { .. })));
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let result = load_documents(&[PathBuf::from("image.png")]).await;
        assert!(matches!(result, Err(LoadError::Unsupported { .. })));
    }
}
