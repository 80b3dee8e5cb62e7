use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-ada-002";

/// Default chunk window in tokens.
pub const DEFAULT_CHUNK_TOKENS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub local_model: LocalModelConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("retriever").join("config.toml"))
    }

    /// Load from an explicit path, or the platform config dir, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::config_path().filter(|p| p.exists()),
        };
        if let Some(path) = path {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            return Ok(config);
        }
        Ok(Self::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_url")]
    pub url: String,

    #[serde(default = "default_openai_model")]
    pub model: String,

    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    /// The API key comes from the environment, never the config file.
    pub fn api_key() -> Option<String> {
        std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
    }
}

fn default_openai_url() -> String {
    DEFAULT_OPENAI_URL.to_string()
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_openai_timeout() -> u64 {
    60
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            url: default_openai_url(),
            model: default_openai_model(),
            timeout_secs: default_openai_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelConfig {
    /// Directory containing `model.onnx` and `tokenizer.json`. When unset the
    /// local backend is disabled and only remote embedding is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,

    #[serde(default = "default_local_max_tokens")]
    pub max_tokens: u32,
}

fn default_local_max_tokens() -> u32 {
    384
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            max_tokens: default_local_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Overrides the `DATABASE_URL` environment variable when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl RegistryConfig {
    pub fn database_url(&self) -> Result<String, ConfigError> {
        if let Some(ref url) = self.database_url {
            return Ok(url.clone());
        }
        std::env::var("DATABASE_URL").map_err(|_| {
            ConfigError::ValidationError(
                "registry database_url is not set and DATABASE_URL is missing".to_string(),
            )
        })
    }
}

fn default_pool_max() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    30
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            pool_max: default_pool_max(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_tokens")]
    pub chunk_token_size: usize,

    /// Windows shorter than this many characters are not embedded.
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,

    /// Hard cap on chunks produced from a single document.
    #[serde(default = "default_max_chunks")]
    pub max_chunks_per_document: usize,
}

fn default_chunk_tokens() -> usize {
    DEFAULT_CHUNK_TOKENS
}

fn default_min_chunk_chars() -> usize {
    5
}

fn default_max_chunks() -> usize {
    10_000
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_token_size: default_chunk_tokens(),
            min_chunk_chars: default_min_chunk_chars(),
            max_chunks_per_document: default_max_chunks(),
        }
    }
}
