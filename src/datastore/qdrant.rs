//! Qdrant vector store backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use futures::future;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct, Range,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use uuid::Uuid;

use crate::error::VectorStoreError;
use crate::models::{
    DocumentChunk, DocumentMetadata, DocumentMetadataFilter, EmbeddingMode, QueryResult,
    QueryWithEmbedding, ScoredChunk, VectorStoreConfig,
};

use super::DataStore;

pub struct QdrantDataStore {
    client: Qdrant,
}

impl QdrantDataStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self { client })
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorStoreError> {
        match self.client.collection_info(collection).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("doesn't exist") {
                    Ok(false)
                } else {
                    Err(VectorStoreError::CollectionError(msg))
                }
            }
        }
    }

    /// Chunk ids map to stable point ids, so re-upserting a chunk overwrites
    /// its point instead of duplicating it.
    fn point_id(chunk_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
    }

    fn metadata_conditions(filter: &DocumentMetadataFilter) -> Vec<Condition> {
        let mut conditions = Vec::new();

        if let Some(ref document_id) = filter.document_id {
            conditions.push(Condition::matches("document_id", document_id.clone()));
        }
        if let Some(source) = filter.source {
            conditions.push(Condition::matches("source", source.to_string()));
        }
        if let Some(ref source_id) = filter.source_id {
            conditions.push(Condition::matches("source_id", source_id.clone()));
        }
        if let Some(ref author) = filter.author {
            conditions.push(Condition::matches("author", author.clone()));
        }
        if filter.created_after.is_some() || filter.created_before.is_some() {
            conditions.push(Condition::range(
                "created_at",
                Range {
                    gte: filter.created_after.map(|t| t.timestamp() as f64),
                    lte: filter.created_before.map(|t| t.timestamp() as f64),
                    ..Default::default()
                },
            ));
        }

        conditions
    }

    fn chunk_to_point(chunk: &DocumentChunk, vector: Vec<f32>) -> PointStruct {
        let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        payload.insert("id".to_string(), chunk.id.clone().into());
        payload.insert("document_id".to_string(), chunk.document_id.clone().into());
        payload.insert("text".to_string(), chunk.text.clone().into());
        if let Some(source) = chunk.metadata.source {
            payload.insert("source".to_string(), source.to_string().into());
        }
        if let Some(ref source_id) = chunk.metadata.source_id {
            payload.insert("source_id".to_string(), source_id.clone().into());
        }
        if let Some(ref author) = chunk.metadata.author {
            payload.insert("author".to_string(), author.clone().into());
        }
        if let Some(created_at) = chunk.metadata.created_at {
            // Stored as a unix timestamp so range conditions work
            payload.insert("created_at".to_string(), created_at.timestamp().into());
        }
        if let Some(ref url) = chunk.metadata.url {
            payload.insert("url".to_string(), url.clone().into());
        }

        PointStruct::new(Self::point_id(&chunk.id), vector, payload)
    }

    fn point_to_chunk(payload: &HashMap<String, qdrant_client::qdrant::Value>) -> DocumentChunk {
        DocumentChunk {
            id: payload_str(payload, "id").unwrap_or_default(),
            document_id: payload_str(payload, "document_id").unwrap_or_default(),
            text: payload_str(payload, "text").unwrap_or_default(),
            metadata: DocumentMetadata {
                source: payload_str(payload, "source").and_then(|s| s.parse().ok()),
                source_id: payload_str(payload, "source_id"),
                author: payload_str(payload, "author"),
                created_at: payload_i64(payload, "created_at")
                    .and_then(|ts| DateTime::from_timestamp(ts, 0)),
                url: payload_str(payload, "url"),
            },
            embedding: None,
        }
    }

    async fn search_one(
        &self,
        query: &QueryWithEmbedding,
        collection: &str,
    ) -> Result<QueryResult, VectorStoreError> {
        let mut builder = SearchPointsBuilder::new(
            collection,
            query.embedding.clone(),
            query.query.limit(),
        )
        .with_payload(true);

        if let Some(ref filter) = query.query.filter {
            let conditions = Self::metadata_conditions(filter);
            if !conditions.is_empty() {
                builder = builder.filter(Filter::must(conditions));
            }
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        let results = response
            .result
            .into_iter()
            .map(|point| ScoredChunk {
                chunk: Self::point_to_chunk(&point.payload),
                score: point.score,
            })
            .collect();

        Ok(QueryResult {
            query: query.query.query.clone(),
            results,
        })
    }
}

fn payload_str(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
    key: &str,
) -> Option<String> {
    payload.get(key).and_then(|v| match &v.kind {
        Some(qdrant_client::qdrant::value::Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    })
}

fn payload_i64(payload: &HashMap<String, qdrant_client::qdrant::Value>, key: &str) -> Option<i64> {
    payload.get(key).and_then(|v| match &v.kind {
        Some(qdrant_client::qdrant::value::Kind::IntegerValue(n)) => Some(*n),
        _ => None,
    })
}

#[async_trait]
impl DataStore for QdrantDataStore {
    async fn upsert_chunks(
        &self,
        chunks: &HashMap<String, Vec<DocumentChunk>>,
        collection: &str,
        mode: EmbeddingMode,
    ) -> Result<Vec<String>, VectorStoreError> {
        let mut points = Vec::new();
        for chunk in chunks.values().flatten() {
            let Some(ref embedding) = chunk.embedding else {
                return Err(VectorStoreError::UpsertError(format!(
                    "chunk '{}' has no embedding",
                    chunk.id
                )));
            };
            if embedding.len() as u64 != mode.dimension() {
                return Err(VectorStoreError::ModeMismatch {
                    collection: collection.to_string(),
                    expected: mode.to_string(),
                    requested: format!("{}-dimensional vector", embedding.len()),
                });
            }
            points.push(Self::chunk_to_point(chunk, embedding.clone()));
        }

        if points.is_empty() {
            return Ok(Vec::new());
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points))
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        Ok(chunks.keys().cloned().collect())
    }

    async fn query_embedded(
        &self,
        queries: &[QueryWithEmbedding],
        collection: &str,
        _mode: EmbeddingMode,
    ) -> Result<Vec<QueryResult>, VectorStoreError> {
        future::try_join_all(queries.iter().map(|q| self.search_one(q, collection))).await
    }

    async fn delete(
        &self,
        ids: Option<&[String]>,
        filter: Option<&DocumentMetadataFilter>,
        delete_all: bool,
        collection: &str,
    ) -> Result<bool, VectorStoreError> {
        if delete_all {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(collection).points(Filter::default()),
                )
                .await
                .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
            return Ok(true);
        }

        if let Some(ids) = ids
            && !ids.is_empty()
        {
            let conditions: Vec<Condition> = ids
                .iter()
                .map(|id| Condition::matches("document_id", id.clone()))
                .collect();
            self.client
                .delete_points(
                    DeletePointsBuilder::new(collection).points(Filter::should(conditions)),
                )
                .await
                .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
        }

        if let Some(filter) = filter {
            let conditions = Self::metadata_conditions(filter);
            // An empty condition list would match every point
            if !conditions.is_empty() {
                self.client
                    .delete_points(
                        DeletePointsBuilder::new(collection).points(Filter::must(conditions)),
                    )
                    .await
                    .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
            }
        }

        Ok(true)
    }

    async fn create_collection(
        &self,
        collection: &str,
        mode: EmbeddingMode,
    ) -> Result<bool, VectorStoreError> {
        if self.collection_exists(collection).await? {
            return Ok(true);
        }

        let create = CreateCollectionBuilder::new(collection).vectors_config(
            VectorParamsBuilder::new(mode.dimension(), Distance::Cosine),
        );

        self.client
            .create_collection(create)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        Ok(true)
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool, VectorStoreError> {
        if !self.collection_exists(collection).await? {
            return Ok(true);
        }

        self.client
            .delete_collection(collection)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

        Ok(true)
    }
}
