pub mod api;
mod collection;
mod config;
mod document;
mod query;

pub use collection::{
    ActiveCollection, EmbeddingMode, ResolvedCollection, internal_collection_name,
};
pub use config::{
    ChunkingConfig, Config, DEFAULT_CHUNK_TOKENS, DEFAULT_LISTEN_ADDR, DEFAULT_OPENAI_MODEL,
    DEFAULT_OPENAI_URL, DEFAULT_QDRANT_URL, LocalModelConfig, OpenAiConfig, RegistryConfig,
    ServerConfig, VectorStoreConfig,
};
pub use document::{Document, DocumentChunk, DocumentMetadata, DocumentMetadataFilter, Source};
pub use query::{DEFAULT_TOP_K, Query, QueryResult, QueryWithEmbedding, ScoredChunk};
