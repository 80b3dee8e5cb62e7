mod chunker;
pub mod embedding;

pub use chunker::TextChunker;
pub use embedding::{Embedders, LocalEmbedder, OpenAiEmbedder, TextEmbedder, embed_with_retry};
