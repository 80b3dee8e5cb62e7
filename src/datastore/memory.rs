//! In-memory vector store.
//!
//! Holds chunks in plain vectors behind an async lock and scores them with
//! brute-force cosine similarity. Used in tests and for single-process
//! deployments without a Qdrant instance.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::VectorStoreError;
use crate::models::{
    DocumentChunk, DocumentMetadataFilter, EmbeddingMode, QueryResult, QueryWithEmbedding,
    ScoredChunk,
};

use super::DataStore;

struct MemoryCollection {
    mode: EmbeddingMode,
    // Insertion order is preserved so equal-score results rank stably
    chunks: Vec<DocumentChunk>,
}

#[derive(Default)]
pub struct InMemoryDataStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks currently held in a collection.
    pub async fn chunk_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, |c| c.chunks.len())
    }

    /// Chunk ids currently held in a collection, in insertion order.
    pub async fn chunk_ids(&self, collection: &str) -> Vec<String> {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or_else(Vec::new, |c| c.chunks.iter().map(|ch| ch.id.clone()).collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn check_mode(
    collection: &str,
    stored: EmbeddingMode,
    requested: EmbeddingMode,
) -> Result<(), VectorStoreError> {
    if stored != requested {
        return Err(VectorStoreError::ModeMismatch {
            collection: collection.to_string(),
            expected: stored.to_string(),
            requested: requested.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn upsert_chunks(
        &self,
        chunks: &HashMap<String, Vec<DocumentChunk>>,
        collection: &str,
        mode: EmbeddingMode,
    ) -> Result<Vec<String>, VectorStoreError> {
        let mut collections = self.collections.write().await;
        let entry = collections.get_mut(collection).ok_or_else(|| {
            VectorStoreError::CollectionError(format!("collection '{}' does not exist", collection))
        })?;
        check_mode(collection, entry.mode, mode)?;

        for (document_id, document_chunks) in chunks {
            // Same chunk ids overwrite in place of duplicating
            entry
                .chunks
                .retain(|existing| existing.document_id != *document_id);
            entry.chunks.extend(document_chunks.iter().cloned());
        }

        Ok(chunks.keys().cloned().collect())
    }

    async fn query_embedded(
        &self,
        queries: &[QueryWithEmbedding],
        collection: &str,
        mode: EmbeddingMode,
    ) -> Result<Vec<QueryResult>, VectorStoreError> {
        let collections = self.collections.read().await;
        let entry = collections.get(collection).ok_or_else(|| {
            VectorStoreError::CollectionError(format!("collection '{}' does not exist", collection))
        })?;
        check_mode(collection, entry.mode, mode)?;

        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            let mut scored: Vec<ScoredChunk> = entry
                .chunks
                .iter()
                .filter(|chunk| {
                    query
                        .query
                        .filter
                        .as_ref()
                        .is_none_or(|f| f.matches(chunk))
                })
                .filter_map(|chunk| {
                    let embedding = chunk.embedding.as_ref()?;
                    Some(ScoredChunk {
                        score: cosine_similarity(&query.embedding, embedding),
                        chunk: DocumentChunk {
                            embedding: None,
                            ..chunk.clone()
                        },
                    })
                })
                .collect();

            // Stable sort keeps insertion order among equal scores
            scored.sort_by(|a, b| b.score.total_cmp(&a.score));
            scored.truncate(query.query.limit() as usize);

            results.push(QueryResult {
                query: query.query.query.clone(),
                results: scored,
            });
        }

        Ok(results)
    }

    async fn delete(
        &self,
        ids: Option<&[String]>,
        filter: Option<&DocumentMetadataFilter>,
        delete_all: bool,
        collection: &str,
    ) -> Result<bool, VectorStoreError> {
        let mut collections = self.collections.write().await;
        let Some(entry) = collections.get_mut(collection) else {
            // Nothing to delete is a successful no-op
            return Ok(true);
        };

        if delete_all {
            let removed = entry.chunks.len();
            entry.chunks.clear();
            debug!(collection = %collection, removed, "cleared collection");
            return Ok(true);
        }

        let before = entry.chunks.len();
        entry.chunks.retain(|chunk| {
            let by_id = ids.is_some_and(|ids| ids.iter().any(|id| chunk.document_id == *id));
            let by_filter = filter.is_some_and(|f| !f.is_empty() && f.matches(chunk));
            !(by_id || by_filter)
        });
        debug!(
            collection = %collection,
            removed = before - entry.chunks.len(),
            "deleted chunks"
        );

        Ok(true)
    }

    async fn create_collection(
        &self,
        collection: &str,
        mode: EmbeddingMode,
    ) -> Result<bool, VectorStoreError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_insert_with(|| MemoryCollection {
                mode,
                chunks: Vec::new(),
            });
        Ok(true)
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool, VectorStoreError> {
        self.collections.write().await.remove(collection);
        Ok(true)
    }
}
