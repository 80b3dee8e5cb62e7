//! Query and result models for the retrieval pipeline.

use serde::{Deserialize, Serialize};

use super::document::{DocumentChunk, DocumentMetadataFilter};

/// Default number of results per query when the caller does not set `top_k`.
pub const DEFAULT_TOP_K: u64 = 3;

/// A natural-language query with optional metadata scoping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub query: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<DocumentMetadataFilter>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u64>,
}

impl Query {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filter: None,
            top_k: None,
        }
    }

    pub fn with_filter(mut self, filter: DocumentMetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_top_k(mut self, top_k: u64) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Effective result limit for this query.
    pub fn limit(&self) -> u64 {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }
}

/// A query paired with its resolved embedding.
///
/// Built by the orchestration core after the batch embedding call; callers
/// never supply the embedding themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryWithEmbedding {
    #[serde(flatten)]
    pub query: Query,
    pub embedding: Vec<f32>,
}

impl QueryWithEmbedding {
    pub fn new(query: Query, embedding: Vec<f32>) -> Self {
        Self { query, embedding }
    }
}

/// A chunk paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Ranked results for one query, ordered by descending score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub results: Vec<ScoredChunk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_to_top_k_constant() {
        assert_eq!(Query::new("refund policy").limit(), DEFAULT_TOP_K);
        assert_eq!(Query::new("refund policy").with_top_k(7).limit(), 7);
    }

    #[test]
    fn query_with_embedding_flattens_query_fields() {
        let qwe = QueryWithEmbedding::new(Query::new("hello"), vec![1.0, 0.0]);
        let json = serde_json::to_value(&qwe).unwrap();
        assert_eq!(json["query"], "hello");
        assert_eq!(json["embedding"].as_array().unwrap().len(), 2);
    }
}
