//! Ollama availability detection.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Ollama is not running at {url}")]
    NotRunning { url: String },

    #[error("Failed to check Ollama status: {0}")]
    CheckFailed(String),
}

pub type Result<T> = std::result::Result<T, DetectionError>;

/// Information about a running Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaInfo {
    pub base_url: String,
    /// Installed model names, tags included (`llama3.1:latest`)
    pub models: Vec<String>,
}

impl OllamaInfo {
    /// Whether `name` is installed. A name without a tag also matches `name:latest`.
    pub fn has_model(&self, name: &str) -> bool {
        self.models.iter().any(|installed| {
            installed == name
                || installed.strip_suffix(":latest") == Some(name)
                || name.strip_suffix(":latest") == Some(installed.as_str())
        })
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Checks that Ollama answers at `base_url` and lists its installed models.
///
/// # Example
///
/// ```no_run
/// # async fn example() {
/// use pagewise_core::detection;
///
/// match detection::probe_ollama("http://localhost:11434").await {
///     Ok(info) => println!("{} models installed", info.models.len()),
///     Err(e) => eprintln!("Setup required: {}", e),
/// }
/// # }
/// ```
pub async fn probe_ollama(base_url: &str) -> Result<OllamaInfo> {
    let base_url = base_url.trim_end_matches('/');
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| DetectionError::CheckFailed(e.to_string()))?;

    let response = client
        .get(format!("{}/api/tags", base_url))
        .send()
        .await
        .map_err(|e| {
            debug!(error = %e, "Ollama probe failed");
            DetectionError::NotRunning {
                url: base_url.to_string(),
            }
        })?;

    if !response.status().is_success() {
        return Err(DetectionError::CheckFailed(format!(
            "unexpected status {}",
            response.status()
        )));
    }

    let tags = response
        .json::<TagsResponse>()
        .await
        .map_err(|e| DetectionError::CheckFailed(e.to_string()))?;

    Ok(OllamaInfo {
        base_url: base_url.to_string(),
        models: tags.models.into_iter().map(|m| m.name).collect(),
    })
}

/// Short instructions for starting Ollama and pulling the default models.
pub fn startup_help() -> &'static str {
    "Start Ollama with `ollama serve`, then pull the models:\n  \
     ollama pull llama3.1\n  \
     ollama pull embeddinggemma"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(models: &[&str]) -> OllamaInfo {
        OllamaInfo {
            base_url: "http://localhost:11434".into(),
            models: models.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_has_model_latest_tag() {
        let info = info(&["llama3.1:latest", "embeddinggemma:300m"]);
        assert!(info.has_model("llama3.1"));
        assert!(info.has_model("llama3.1:latest"));
        assert!(info.has_model("embeddinggemma:300m"));
        assert!(!info.has_model("embeddinggemma"));
        assert!(!info.has_model("llama3"));
    }

    #[test]
    fn test_tags_response_parsing() {
        let json = r#"{"models":[{"name":"llama3.1:latest","size":4661224676},{"name":"nomic-embed-text:latest"}]}"#;
        let tags: TagsResponse = serde_json::from_str(json).unwrap();
        let names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["llama3.1:latest", "nomic-embed-text:latest"]);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_not_running() {
        let result = probe_ollama("http://127.0.0.1:9/").await;
        assert!(matches!(
            result,
            Err(DetectionError::NotRunning { url }) if url == "http://127.0.0.1:9"
        ));
    }
}
