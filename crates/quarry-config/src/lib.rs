//! Configuration for quarry.
//!
//! Settings come from a TOML file and `QUARRY__SECTION__KEY` environment
//! overrides. Every section has defaults, so an empty file is a valid config.

use std::path::{Path, PathBuf};

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "QUARRY";

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to load config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub retrieval: RetrievalConfig,
    pub embeddings: Option<EmbeddingsConfig>,
    pub reranker: Option<RerankerConfig>,
    pub vector_store: VectorStoreConfig,
    pub recency: RecencyConfig,
}

/// Retrieval budgets and switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates requested from each source
    pub n_retrieve: usize,
    /// Chunks returned per query
    pub n_final: usize,
    pub include_embeddings: bool,
    pub filter_directory: Option<String>,
    /// Fused candidates sent to the reranker
    pub max_rerank_candidates: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            n_retrieve: 25,
            n_final: 10,
            include_embeddings: true,
            filter_directory: None,
            max_rerank_candidates: 50,
        }
    }
}

/// OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// API base URL, e.g. `http://localhost:8100/v1`
    pub base_url: String,
    pub model: String,
    /// API key or `${ENV_VAR}` reference
    #[serde(default)]
    pub api_key: Option<String>,
    pub dimensions: usize,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_max_chunk_size() -> usize {
    512
}

fn default_max_batch_size() -> usize {
    32
}

impl EmbeddingsConfig {
    pub fn resolved_base_url(&self) -> String {
        expand(&self.base_url).unwrap_or_else(|| self.base_url.clone())
    }

    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.as_deref().and_then(expand)
    }
}

/// Cohere/Jina style `/rerank` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    pub base_url: String,
    #[serde(default = "default_rerank_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_rerank_model() -> String {
    "bge-reranker".to_string()
}

impl RerankerConfig {
    pub fn resolved_base_url(&self) -> String {
        expand(&self.base_url).unwrap_or_else(|| self.base_url.clone())
    }

    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.as_deref().and_then(expand)
    }
}

/// Where embedded chunks live. Without a Qdrant URL, chunks are embedded
/// into an in-memory index at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<String>,
    pub collection: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            qdrant_url: None,
            qdrant_api_key: None,
            collection: "quarry-chunks".to_string(),
        }
    }
}

impl VectorStoreConfig {
    pub fn resolved_qdrant_url(&self) -> Option<String> {
        self.qdrant_url.as_deref().and_then(expand)
    }

    pub fn resolved_qdrant_api_key(&self) -> Option<String> {
        self.qdrant_api_key.as_deref().and_then(expand)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecencyConfig {
    /// Edited files remembered
    pub capacity: usize,
    /// Edits older than this are ignored
    pub max_age_secs: Option<u64>,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_age_secs: None,
        }
    }
}

/// Expand `~` and `${VAR}` references. Returns `None` for an empty result or
/// an unset variable.
pub fn expand(value: &str) -> Option<String> {
    match shellexpand::full(value) {
        Ok(expanded) if !expanded.is_empty() => Some(expanded.into_owned()),
        _ => None,
    }
}

/// `<config dir>/quarry/config.toml`, if the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("quarry").join("config.toml"))
}

impl Config {
    /// Load from `path`, or from [`default_path`] when `None`.
    ///
    /// An explicit path must exist; the default one may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (Some(path.to_path_buf()), true),
            None => (default_path(), false),
        };

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if required && !path.exists() {
                return Err(ConfigError::NotFound(path));
            }
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(required),
            );
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document, without environment overrides.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.n_final == 0 {
            return Err(ConfigError::Invalid("retrieval.n_final must be at least 1".to_string()));
        }
        if self.retrieval.n_retrieve == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.n_retrieve must be at least 1".to_string(),
            ));
        }
        if let Some(embeddings) = &self.embeddings {
            if embeddings.max_chunk_size == 0 {
                return Err(ConfigError::Invalid(
                    "embeddings.max_chunk_size must be at least 1".to_string(),
                ));
            }
            if embeddings.dimensions == 0 {
                return Err(ConfigError::Invalid(
                    "embeddings.dimensions must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Filter directory with `~` expanded.
    pub fn filter_directory(&self) -> Option<String> {
        self.retrieval
            .filter_directory
            .as_deref()
            .map(|dir| shellexpand::tilde(dir).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL: &str = r#"
[retrieval]
n_retrieve = 40
n_final = 5
include_embeddings = false
filter_directory = "/repo/src"

[embeddings]
base_url = "http://localhost:8100/v1"
model = "bce-embedding"
api_key = "${QUARRY_TEST_UNSET_KEY}"
dimensions = 768

[reranker]
base_url = "http://localhost:8101/v1"

[vector_store]
qdrant_url = "http://localhost:6334"

[recency]
capacity = 20
max_age_secs = 3600
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retrieval.n_retrieve, 25);
        assert_eq!(config.retrieval.n_final, 10);
        assert_eq!(config.retrieval.max_rerank_candidates, 50);
        assert!(config.retrieval.include_embeddings);
        assert!(config.embeddings.is_none());
        assert!(config.reranker.is_none());
        assert_eq!(config.vector_store.collection, "quarry-chunks");
        assert_eq!(config.recency.capacity, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(FULL).unwrap();
        assert_eq!(config.retrieval.n_retrieve, 40);
        assert_eq!(config.retrieval.n_final, 5);
        assert!(!config.retrieval.include_embeddings);

        let embeddings = config.embeddings.unwrap();
        assert_eq!(embeddings.dimensions, 768);
        assert_eq!(embeddings.max_chunk_size, 512);
        assert_eq!(embeddings.max_batch_size, 32);
        // Unset variables resolve to no key at all
        assert_eq!(embeddings.resolved_api_key(), None);

        let reranker = config.reranker.unwrap();
        assert_eq!(reranker.model, "bge-reranker");
        assert_eq!(reranker.resolved_base_url(), "http://localhost:8101/v1");

        assert_eq!(config.recency.max_age_secs, Some(3600));
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.retrieval.n_final, 10);
    }

    #[test]
    fn test_rejects_zero_n_final() {
        let err = Config::from_toml_str("[retrieval]\nn_final = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let toml = r#"
[embeddings]
base_url = "http://localhost"
model = "m"
dimensions = 8
max_chunk_size = 0
"#;
        assert!(matches!(
            Config::from_toml_str(toml).unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let file = write_config(FULL);
        let config = Config::load_with_env(Some(file.path()), Some(config::Map::new())).unwrap();
        assert_eq!(config.retrieval.n_final, 5);
        assert_eq!(config.vector_store.resolved_qdrant_url().as_deref(), Some("http://localhost:6334"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/definitely/not/quarry.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config(FULL);
        let mut env = config::Map::new();
        env.insert("QUARRY__RETRIEVAL__N_FINAL".to_string(), "7".to_string());
        let config = Config::load_with_env(Some(file.path()), Some(env)).unwrap();
        assert_eq!(config.retrieval.n_final, 7);
        assert_eq!(config.retrieval.n_retrieve, 40);
    }

    #[test]
    fn test_expand() {
        assert_eq!(expand("plain-key").as_deref(), Some("plain-key"));
        assert_eq!(expand(""), None);
        assert_eq!(expand("${QUARRY_TEST_UNSET_KEY}"), None);
        assert!(!expand("~/quarry").unwrap().starts_with('~'));
    }
}
