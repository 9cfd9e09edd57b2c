use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for ingestion, querying and web fetching.
///
/// Every section falls back to its defaults when missing from the file, so a
/// config that only overrides `rag.chunk_size` is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub web: WebConfig,
}

/// Configuration for the generation model and the Ollama endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Generation (chat) model name
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    /// Timeout applied to every embedding and generation request
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1".to_string(),
            base_url: "http://localhost:11434".to_string(),
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

/// Configuration for RAG processing.
///
/// This covers the embedding model, chunking and retrieval depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub embedding_model: String,
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question
    pub top_k: usize,
    /// Number of chunks sent per embedding request
    pub embed_batch_size: usize,
    pub prompt: PromptConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_model: "embeddinggemma".to_string(),
            chunk_size: 1500,
            chunk_overlap: 200,
            top_k: 4,
            embed_batch_size: 32,
            prompt: PromptConfig::default(),
        }
    }
}

/// Wording of the grounding instruction placed at the top of every prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub instruction: String,
    /// Reply the model is told to give when the context does not cover the question
    pub insufficient_reply: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            instruction: "Answer only from the CONTEXT below. Do not use outside knowledge."
                .to_string(),
            insufficient_reply: "insufficient information".to_string(),
        }
    }
}

/// Vector index backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Embedded LanceDB directory, persisted across runs
    #[default]
    Embedded,
    /// Process-local index, lost on exit
    Memory,
}

/// Storage configuration for the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mode: StorageMode,
    /// Directory of the embedded index (ignored in memory mode)
    pub path: String,
    /// Table holding the index entries
    pub table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::default(),
            path: "./data/lancedb".to_string(),
            table: "chunks".to_string(),
        }
    }
}

impl StorageConfig {
    /// Points the embedded index at `path`, switching from memory mode if needed.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.mode = StorageMode::Embedded;
        self.path = path.into();
        self
    }
}

/// Configuration for the web page fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Hosts that may be fetched, subdomains included. Empty allows any host.
    pub allowed_domains: Vec<String>,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (compatible; pagewise/0.1)".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `config.yaml` if it exists, otherwise use defaults.
    pub fn load_or_default() -> Result<Self> {
        Self::load_or_default_from("config.yaml")
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    ///
    /// A file that exists but cannot be read, parsed or validated is an error.
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::load(path) {
            Err(ConfigError::FileRead(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Checks the values that would otherwise fail deep inside a pipeline run.
    pub fn validate(&self) -> Result<()> {
        let rag = &self.rag;
        if rag.chunk_size == 0 {
            return Err(ConfigError::Invalid("rag.chunk_size must be positive".into()));
        }
        if rag.chunk_overlap >= rag.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "rag.chunk_overlap ({}) must be less than rag.chunk_size ({})",
                rag.chunk_overlap, rag.chunk_size
            )));
        }
        if rag.top_k == 0 {
            return Err(ConfigError::Invalid("rag.top_k must be positive".into()));
        }
        if rag.embed_batch_size == 0 {
            return Err(ConfigError::Invalid("rag.embed_batch_size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rag_config_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.embedding_model, "embeddinggemma");
        assert_eq!(config.chunk_size, 1500);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.top_k, 4);
    }

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.table, "chunks");
        assert_eq!(config.mode, StorageMode::Embedded);
        assert_eq!(config.path, "./data/lancedb");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "rag:\n  chunk_size: 800\n  chunk_overlap: 100\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.rag.chunk_size, 800);
        assert_eq!(config.rag.chunk_overlap, 100);
        assert_eq!(config.rag.top_k, 4);
        assert_eq!(config.llm.model, "llama3.1");
        assert!(config.web.allowed_domains.is_empty());
    }

    #[test]
    fn test_storage_mode_from_yaml() {
        let yaml = "storage:\n  mode: memory\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.mode, StorageMode::Memory);
        assert_eq!(config.storage.table, "chunks");

        let yaml = "storage:\n  mode: embedded\n  path: /tmp/idx\n  table: papers\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.table, "papers");
        assert_eq!(config.storage.mode, StorageMode::Embedded);
        assert_eq!(config.storage.path, "/tmp/idx");
    }

    #[test]
    fn test_validate_rejects_overlap_not_below_size() {
        let mut config = Config::default();
        config.rag.chunk_overlap = config.rag.chunk_size;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut config = Config::default();
        config.rag.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let yaml = "llm:\n  model: qwen2.5\nweb:\n  allowed_domains: [example.com]\n";
        fs::write(&path, yaml).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.llm.model, "qwen2.5");
        assert_eq!(config.web.allowed_domains, vec!["example.com".to_string()]);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/pagewise.yaml"),
            Err(ConfigError::FileRead(_))
        ));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default_from(dir.path().join("config.yaml")).unwrap();
        assert_eq!(config.rag.chunk_size, RagConfig::default().chunk_size);
    }

    #[test]
    fn test_load_or_default_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        fs::write(&path, "rag:\n  chunk_size: 100\n  chunk_overlap: 100\n").unwrap();
        assert!(matches!(
            Config::load_or_default_from(&path),
            Err(ConfigError::Invalid(_))
        ));

        fs::write(&path, "rag: [not, a, map]\n").unwrap();
        assert!(matches!(
            Config::load_or_default_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
