//! Configuration handling for ragloop.
//!
//! Every field has a default, so a missing or empty config file yields the
//! same setup as the reference deployment: Ollama and Chroma on localhost.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use ragloop_core::RecordEmbedding;
use ragloop_ollama::DEFAULT_OLLAMA_URL;
use ragloop_store::DEFAULT_CHROMA_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend endpoints
    #[serde(default)]
    pub backend: BackendConfig,

    /// Model names
    #[serde(default)]
    pub models: ModelsConfig,

    /// Document ingestion
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Retrieval
    #[serde(default)]
    pub query: QueryConfig,

    /// Chat prompts
    #[serde(default)]
    pub chat: ChatConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the model and vector backends listen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_chroma_url")]
    pub chroma_url: String,

    /// Where embeddings are computed
    #[serde(default)]
    pub embedding_backend: EmbeddingBackendKind,
}

/// Source of document and query embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    /// The Ollama server at `ollama_url`
    #[default]
    Ollama,
    /// Zero vectors, no model server needed
    Noop,
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_chroma_url() -> String {
    DEFAULT_CHROMA_URL.to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            chroma_url: default_chroma_url(),
            embedding_backend: EmbeddingBackendKind::default(),
        }
    }
}

/// Models pulled on demand from the model backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_chat_model")]
    pub chat: String,

    #[serde(default = "default_embedding_model")]
    pub embedding: String,
}

fn default_chat_model() -> String {
    "llama3.2:1b".to_string()
}

fn default_embedding_model() -> String {
    "all-minilm".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            chat: default_chat_model(),
            embedding: default_embedding_model(),
        }
    }
}

/// Ingestion-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum estimated tokens per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Collection documents are ingested into
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Description stored with every record
    #[serde(default = "default_description")]
    pub description: String,
}

fn default_chunk_size() -> usize {
    40
}

fn default_collection() -> String {
    "embeddings".to_string()
}

fn default_description() -> String {
    "Information about Star Trek Deep Space Nine".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            collection: default_collection(),
            description: default_description(),
        }
    }
}

/// Query-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Grounding chunks retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Vector carried by retrieved records
    #[serde(default)]
    pub record_embedding: RecordEmbedding,
}

fn default_top_k() -> usize {
    5
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            record_embedding: RecordEmbedding::default(),
        }
    }
}

/// Prompts sent to the chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// First System turn of every conversation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Prepended to every retrieved chunk
    #[serde(default = "default_grounding_prefix")]
    pub grounding_prefix: String,
}

fn default_system_prompt() -> String {
    "You are an assistant that reads from a children's book called The Tale of Don Ni and \
     Natali, and help people by answering questions from it. You always try to adhere as \
     strictly as possible to the information in that book. The document is about a fictional \
     character named Don Ni, and all questions will be about it."
        .to_string()
}

fn default_grounding_prefix() -> String {
    "Here's what you know about Don Ni regarding the question that was asked: ".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            grounding_prefix: default_grounding_prefix(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the default config path, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::read(&path),
            _ => Ok(Self::default()),
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Path of the config file.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Annotated sample config with every default spelled out.
    pub fn sample_toml() -> String {
        format!(
            r#"# ragloop configuration

[backend]
ollama_url = "{ollama}"
chroma_url = "{chroma}"
# Embedding source: "ollama" or "noop" (zero vectors, offline)
embedding_backend = "ollama"

[models]
chat = "{chat}"
embedding = "{embedding}"

[ingest]
# Maximum estimated tokens (characters / 4) per chunk
chunk_size = {chunk_size}
collection = "{collection}"
description = "{description}"

[query]
top_k = {top_k}
# Vector on retrieved records: "query", "stored" or "omitted"
record_embedding = "query"

[chat]
system_prompt = "{system_prompt}"
grounding_prefix = "{grounding_prefix}"

[logging]
level = "{level}"
"#,
            ollama = default_ollama_url(),
            chroma = default_chroma_url(),
            chat = default_chat_model(),
            embedding = default_embedding_model(),
            chunk_size = default_chunk_size(),
            collection = default_collection(),
            description = default_description(),
            top_k = default_top_k(),
            system_prompt = default_system_prompt(),
            grounding_prefix = default_grounding_prefix(),
            level = default_log_level(),
        )
    }
}

/// Get the XDG config directory for ragloop.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("RAGLOOP_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "ragloop").map(|dirs| dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.ingest.chunk_size, 40);
        assert_eq!(config.query.top_k, 5);
        assert_eq!(config.models.embedding, "all-minilm");
    }

    #[test]
    fn test_sample_toml_matches_defaults() {
        let config: Config = toml::from_str(&Config::sample_toml()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [query]
            record_embedding = "stored"

            [backend]
            chroma_url = "http://chroma:8000"
            "#,
        )
        .unwrap();

        assert_eq!(config.query.record_embedding, RecordEmbedding::Stored);
        assert_eq!(config.query.top_k, 5);
        assert_eq!(config.backend.chroma_url, "http://chroma:8000");
        assert_eq!(config.backend.ollama_url, DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn test_noop_embedding_backend() {
        let config: Config = toml::from_str("[backend]\nembedding_backend = \"noop\"").unwrap();

        assert_eq!(config.backend.embedding_backend, EmbeddingBackendKind::Noop);
        assert_eq!(config.backend.ollama_url, DEFAULT_OLLAMA_URL);
        assert_eq!(
            Config::default().backend.embedding_backend,
            EmbeddingBackendKind::Ollama
        );
    }

    #[test]
    fn test_unknown_embedding_backend_rejected() {
        assert!(toml::from_str::<Config>("[backend]\nembedding_backend = \"candle\"").is_err());
    }

    #[test]
    fn test_default_grounding_prefix_names_the_book() {
        let config = Config::default();
        assert!(config.chat.grounding_prefix.contains("Don Ni"));
        assert_ne!(
            config.chat.grounding_prefix,
            ragloop_query::DEFAULT_GROUNDING_PREFIX
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ingest]\nchunk_size = 2\ncollection = \"ds9\"").unwrap();

        let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.ingest.chunk_size, 2);
        assert_eq!(config.ingest.collection, "ds9");
    }

    #[test]
    fn test_load_from_missing_file() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[query]\ntop_k = \"many\"").unwrap();

        assert!(Config::load_from(Some(file.path().to_path_buf())).is_err());
    }
}
