//! Application configuration.
//!
//! Layered from an optional TOML file plus `BRIDGE_*` environment variables
//! (e.g. `BRIDGE_ODATA__PASSWORD` overrides `odata.password`).

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration for the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub odata: OdataConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

/// Connection settings for the OData backend.
#[derive(Debug, Clone, Deserialize)]
pub struct OdataConfig {
    /// Service root, e.g. `http://host/base/odata/standard.odata`.
    pub base_url: String,
    pub username: String,
    pub password: String,
}

/// LLM settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// Ollama endpoint.
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// System prompt template for the execution stage. Rendered with
    /// `entity` and `context` variables.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

/// Metadata indexing and retrieval settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexingConfig {
    /// Documents per vector-store write. Must be greater than zero.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Result limit for the generic relevance search.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum similarity score for the generic relevance search.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Entities containing any of these substrings are not indexed.
    #[serde(default)]
    pub exclude_entities: Vec<String>,
    /// Field names (exact match) never indexed, regardless of entity.
    #[serde(default)]
    pub exclude_fields: Vec<String>,
    /// When non-empty, only these entity names are indexed.
    #[serde(default)]
    pub include_only: Vec<String>,
    /// When true, the execution-stage context is narrowed to the classified
    /// entity's own fields instead of a general relevance search.
    #[serde(default)]
    pub narrow_entity_fields: bool,
}

/// Local storage locations.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the LanceDB database and the embedding model cache.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl BridgeConfig {
    /// Load configuration from `path` (optional) and the environment.
    pub fn load(path: Option<&str>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("bridge").required(false));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("BRIDGE").separator("__"))
            .build()?;
        let config: Self = settings.try_deserialize()?;

        if config.indexing.batch_size == 0 {
            return Err(config::ConfigError::Message(
                "indexing.batch_size must be greater than zero".to_string(),
            )
            .into());
        }

        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            model: default_model(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            exclude_entities: Vec::new(),
            exclude_fields: Vec::new(),
            include_only: Vec::new(),
            narrow_entity_fields: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

fn default_bind() -> SocketAddr {
    "127.0.0.1:8080".parse().expect("valid default bind address")
}

fn default_ai_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "qwen2.5:14b".to_string()
}

fn default_system_prompt() -> String {
    include_str!("prompts/system.md").to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_top_k() -> usize {
    10
}

fn default_similarity_threshold() -> f32 {
    0.75
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[cfg(test)]
mod tests {
    use super::IndexingConfig;

    #[test]
    fn indexing_defaults_match_documented_values() {
        let config = IndexingConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.top_k, 10);
        assert!((config.similarity_threshold - 0.75).abs() < f32::EPSILON);
        assert!(config.include_only.is_empty());
        assert!(!config.narrow_entity_fields);
    }
}
