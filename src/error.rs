//! Error types for the retrieval service.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to embedding backends.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to reach embedding backend: {0}")]
    ConnectionError(String),

    #[error("embedding backend error: {0}")]
    BackendError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding batch size mismatch: sent {sent} texts, got {received} vectors")]
    BatchMismatch { sent: usize, received: usize },

    #[error("local embedding model is not loaded")]
    ModelNotLoaded,

    #[error("local model error: {0}")]
    Model(#[from] ModelError),

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            // Connection and timeout errors are retryable
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            // Backend errors might be transient (e.g., 429 or 503 from the API)
            EmbeddingError::BackendError(msg) => {
                msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.to_lowercase().contains("unavailable")
                    || msg.to_lowercase().contains("too many requests")
            }
            // Request errors depend on the underlying cause
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            // Malformed responses and local model failures are not retryable
            EmbeddingError::InvalidResponse(_)
            | EmbeddingError::BatchMismatch { .. }
            | EmbeddingError::ModelNotLoaded
            | EmbeddingError::Model(_) => false,
        }
    }
}

/// Errors related to the local ONNX embedding model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("model load error: {0}")]
    LoadError(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference error: {0}")]
    InferenceError(String),
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector store: {0}")]
    ConnectionError(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("delete error: {0}")]
    DeleteError(String),

    #[error(
        "collection '{collection}' was created with embedding mode '{expected}', got '{requested}'"
    )]
    ModeMismatch {
        collection: String,
        expected: String,
        requested: String,
    },
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            // Connection errors are always retryable
            VectorStoreError::ConnectionError(_) => true,
            // Mixing embedding spaces never fixes itself
            VectorStoreError::ModeMismatch { .. } => false,
            // Other errors might be transient
            VectorStoreError::CollectionError(msg)
            | VectorStoreError::UpsertError(msg)
            | VectorStoreError::SearchError(msg)
            | VectorStoreError::DeleteError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
                    || msg_lower.contains("too many")
            }
        }
    }
}

/// Errors related to the collection registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("collection '{name}' has unrecognized embedding method '{method}'")]
    CorruptMode { name: String, method: String },
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors surfaced by the upsert/query/delete orchestration.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid embedding mode: {0}")]
    InvalidMode(String),

    #[error("embedding backend unavailable after {attempts} attempt(s): {source}")]
    EmbeddingUnavailable {
        attempts: u32,
        source: EmbeddingError,
    },

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("vector store error: {0}")]
    Store(#[from] VectorStoreError),

    #[error("validation error: {0}")]
    Validation(String),
}
