//! Vector store contract and the upsert/query orchestration built on top of
//! it.
//!
//! Backends implement the required methods (`upsert_chunks`,
//! `query_embedded`, `delete`, collection management); the provided `upsert`
//! and `query` methods carry the pipeline logic and are written once against
//! the trait, never per backend.

mod memory;
mod qdrant;

pub use memory::InMemoryDataStore;
pub use qdrant::QdrantDataStore;

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future;
use tracing::{debug, error};

use crate::error::{RetrievalError, VectorStoreError};
use crate::models::{
    Document, DocumentChunk, DocumentMetadataFilter, EmbeddingMode, Query, QueryResult,
    QueryWithEmbedding,
};
use crate::services::embedding::{TextEmbedder, embed_with_retry};
use crate::services::TextChunker;

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Store embedded chunks, grouped by document id, into a collection.
    /// Returns the document ids actually stored.
    async fn upsert_chunks(
        &self,
        chunks: &HashMap<String, Vec<DocumentChunk>>,
        collection: &str,
        mode: EmbeddingMode,
    ) -> Result<Vec<String>, VectorStoreError>;

    /// Search a collection with pre-embedded queries. One result set per
    /// query, in query order, each sorted by descending score.
    async fn query_embedded(
        &self,
        queries: &[QueryWithEmbedding],
        collection: &str,
        mode: EmbeddingMode,
    ) -> Result<Vec<QueryResult>, VectorStoreError>;

    /// Remove chunks matching the union of the supplied criteria. Matching
    /// zero chunks is a successful no-op.
    async fn delete(
        &self,
        ids: Option<&[String]>,
        filter: Option<&DocumentMetadataFilter>,
        delete_all: bool,
        collection: &str,
    ) -> Result<bool, VectorStoreError>;

    /// Create a collection bound to an embedding mode.
    async fn create_collection(
        &self,
        collection: &str,
        mode: EmbeddingMode,
    ) -> Result<bool, VectorStoreError>;

    /// Drop a collection and all its data.
    async fn delete_collection(&self, collection: &str) -> Result<bool, VectorStoreError>;

    /// Insert documents into a collection, replacing any prior version.
    ///
    /// Existing vectors for every caller-supplied document id are deleted
    /// first, concurrently across documents; the documents are then chunked,
    /// embedded as one batch, and stored. A pre-delete failure for any
    /// document fails the whole upsert (after all deletions have been
    /// attempted), because leaving stale chunks behind would break the
    /// replace guarantee.
    async fn upsert(
        &self,
        documents: Vec<Document>,
        chunk_token_size: Option<usize>,
        mode: EmbeddingMode,
        embedder: &dyn TextEmbedder,
        collection: &str,
    ) -> Result<Vec<String>, RetrievalError> {
        let existing: Vec<String> = documents.iter().filter_map(|d| d.id.clone()).collect();

        if !existing.is_empty() {
            let deletions = future::join_all(existing.iter().map(|document_id| {
                let filter = DocumentMetadataFilter::for_document(document_id.clone());
                async move {
                    self.delete(None, Some(&filter), false, collection)
                        .await
                        .map_err(|e| (document_id.clone(), e))
                }
            }))
            .await;

            let mut first_failure = None;
            for result in deletions {
                if let Err((document_id, e)) = result {
                    error!(document_id = %document_id, error = %e, "pre-delete failed");
                    first_failure.get_or_insert(e);
                }
            }
            if let Some(e) = first_failure {
                return Err(RetrievalError::Store(e));
            }
        }

        let mut chunks = TextChunker::with_defaults().chunk_documents(documents, chunk_token_size);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        // Embed every chunk across all documents in one backend call
        let flat: Vec<&mut DocumentChunk> = chunks.values_mut().flatten().collect();
        let texts: Vec<String> = flat.iter().map(|c| c.text.clone()).collect();
        let embeddings = embed_with_retry(embedder, &texts, mode).await?;
        for (chunk, embedding) in flat.into_iter().zip(embeddings) {
            chunk.embedding = Some(embedding);
        }

        debug!(
            documents = chunks.len(),
            chunks = texts.len(),
            collection = %collection,
            "storing embedded chunks"
        );

        Ok(self.upsert_chunks(&chunks, collection, mode).await?)
    }

    /// Answer natural-language queries against a collection.
    ///
    /// All query texts are embedded as one batch; result `i` corresponds to
    /// query `i`.
    async fn query(
        &self,
        queries: Vec<Query>,
        mode: EmbeddingMode,
        embedder: &dyn TextEmbedder,
        collection: &str,
    ) -> Result<Vec<QueryResult>, RetrievalError> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = queries.iter().map(|q| q.query.clone()).collect();
        let embeddings = embed_with_retry(embedder, &texts, mode).await?;

        let with_embeddings: Vec<QueryWithEmbedding> = queries
            .into_iter()
            .zip(embeddings)
            .map(|(query, embedding)| QueryWithEmbedding::new(query, embedding))
            .collect();

        Ok(self.query_embedded(&with_embeddings, collection, mode).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentMetadata, Source};
    use crate::services::embedding::l2_normalize;
    use crate::error::EmbeddingError;

    /// Deterministic embedder: the vector direction is a hash of the text,
    /// so distinct texts get distinct (but stable) unit vectors.
    struct StubEmbedder;

    fn stub_vector(text: &str) -> Vec<f32> {
        let mut h: u32 = 2166136261;
        for b in text.bytes() {
            h ^= u32::from(b);
            h = h.wrapping_mul(16777619);
        }
        l2_normalize(&[
            (h & 0xff) as f32 + 1.0,
            ((h >> 8) & 0xff) as f32 + 1.0,
            ((h >> 16) & 0xff) as f32 + 1.0,
        ])
    }

    #[async_trait]
    impl TextEmbedder for StubEmbedder {
        async fn embed(
            &self,
            texts: &[String],
            _mode: EmbeddingMode,
        ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|t| stub_vector(t)).collect())
        }
    }

    /// Store whose `delete` fails for one document id while the others
    /// succeed, recording every attempted deletion.
    struct FaultyDeleteStore {
        inner: InMemoryDataStore,
        fail_for: String,
        attempted: std::sync::Mutex<Vec<String>>,
        upsert_calls: std::sync::atomic::AtomicUsize,
    }

    impl FaultyDeleteStore {
        async fn new(fail_for: &str) -> Self {
            let inner = InMemoryDataStore::new();
            inner
                .create_collection("c", EmbeddingMode::Mpnet)
                .await
                .unwrap();
            Self {
                inner,
                fail_for: fail_for.to_string(),
                attempted: std::sync::Mutex::new(Vec::new()),
                upsert_calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DataStore for FaultyDeleteStore {
        async fn upsert_chunks(
            &self,
            chunks: &HashMap<String, Vec<DocumentChunk>>,
            collection: &str,
            mode: EmbeddingMode,
        ) -> Result<Vec<String>, VectorStoreError> {
            self.upsert_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.upsert_chunks(chunks, collection, mode).await
        }

        async fn query_embedded(
            &self,
            queries: &[QueryWithEmbedding],
            collection: &str,
            mode: EmbeddingMode,
        ) -> Result<Vec<QueryResult>, VectorStoreError> {
            self.inner.query_embedded(queries, collection, mode).await
        }

        async fn delete(
            &self,
            ids: Option<&[String]>,
            filter: Option<&DocumentMetadataFilter>,
            delete_all: bool,
            collection: &str,
        ) -> Result<bool, VectorStoreError> {
            if let Some(document_id) = filter.and_then(|f| f.document_id.clone()) {
                self.attempted.lock().unwrap().push(document_id.clone());
                if document_id == self.fail_for {
                    return Err(VectorStoreError::DeleteError("backend refused".to_string()));
                }
            }
            self.inner.delete(ids, filter, delete_all, collection).await
        }

        async fn create_collection(
            &self,
            collection: &str,
            mode: EmbeddingMode,
        ) -> Result<bool, VectorStoreError> {
            self.inner.create_collection(collection, mode).await
        }

        async fn delete_collection(&self, collection: &str) -> Result<bool, VectorStoreError> {
            self.inner.delete_collection(collection).await
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl TextEmbedder for BrokenEmbedder {
        async fn embed(
            &self,
            _texts: &[String],
            _mode: EmbeddingMode,
        ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::InvalidResponse("down".to_string()))
        }
    }

    fn doc(id: Option<&str>, text: &str) -> Document {
        Document {
            id: id.map(String::from),
            text: text.to_string(),
            metadata: DocumentMetadata::default(),
        }
    }

    fn article(tokens: usize) -> String {
        (0..tokens)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn fresh_store(mode: EmbeddingMode) -> InMemoryDataStore {
        let store = InMemoryDataStore::new();
        store.create_collection("c", mode).await.unwrap();
        store
    }

    #[tokio::test]
    async fn upsert_chunks_long_documents_deterministically() {
        let store = fresh_store(EmbeddingMode::Mpnet).await;

        let ids = store
            .upsert(
                vec![doc(Some("doc1"), &article(600))],
                Some(200),
                EmbeddingMode::Mpnet,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap();

        assert_eq!(ids, vec!["doc1".to_string()]);
        assert_eq!(store.chunk_count("c").await, 3);

        let chunk_ids = store.chunk_ids("c").await;
        assert!(chunk_ids.contains(&"doc1_0".to_string()));
        assert!(chunk_ids.contains(&"doc1_1".to_string()));
        assert!(chunk_ids.contains(&"doc1_2".to_string()));
    }

    #[tokio::test]
    async fn reupsert_replaces_prior_version_completely() {
        let store = fresh_store(EmbeddingMode::Mpnet).await;

        store
            .upsert(
                vec![doc(Some("doc1"), &article(600))],
                Some(200),
                EmbeddingMode::Mpnet,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap();
        assert_eq!(store.chunk_count("c").await, 3);

        // Second version is shorter; none of the three old chunks may remain
        store
            .upsert(
                vec![doc(Some("doc1"), "replacement text that fits one chunk")],
                Some(200),
                EmbeddingMode::Mpnet,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap();

        assert_eq!(store.chunk_count("c").await, 1);

        let results = store
            .query(
                vec![Query::new("anything").with_top_k(10)],
                EmbeddingMode::Mpnet,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap();
        for scored in &results[0].results {
            assert!(scored.chunk.text.contains("replacement"));
        }
    }

    #[tokio::test]
    async fn documents_without_id_get_generated_ids() {
        let store = fresh_store(EmbeddingMode::Mpnet).await;

        let ids = store
            .upsert(
                vec![doc(None, "first document text"), doc(Some("doc2"), "second")],
                None,
                EmbeddingMode::Mpnet,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"doc2".to_string()));
        assert!(ids.iter().all(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn empty_document_is_dropped_from_returned_ids() {
        let store = fresh_store(EmbeddingMode::Mpnet).await;

        let ids = store
            .upsert(
                vec![doc(Some("empty"), "   "), doc(Some("doc1"), "real content here")],
                None,
                EmbeddingMode::Mpnet,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap();

        assert_eq!(ids, vec!["doc1".to_string()]);
    }

    #[tokio::test]
    async fn embedding_failure_aborts_before_any_store_write() {
        let store = fresh_store(EmbeddingMode::Mpnet).await;

        let err = store
            .upsert(
                vec![doc(Some("doc1"), "some text")],
                None,
                EmbeddingMode::Mpnet,
                &BrokenEmbedder,
                "c",
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RetrievalError::EmbeddingUnavailable { .. }
        ));
        assert_eq!(store.chunk_count("c").await, 0);
    }

    #[tokio::test]
    async fn pre_delete_failure_attempts_all_then_fails_the_upsert() {
        let store = FaultyDeleteStore::new("doc2").await;

        let err = store
            .upsert(
                vec![
                    doc(Some("doc1"), "first document"),
                    doc(Some("doc2"), "second document"),
                    doc(Some("doc3"), "third document"),
                ],
                None,
                EmbeddingMode::Mpnet,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RetrievalError::Store(VectorStoreError::DeleteError(_))
        ));

        // Every deletion was attempted despite doc2 failing
        let mut attempted = store.attempted.lock().unwrap().clone();
        attempted.sort();
        assert_eq!(attempted, vec!["doc1", "doc2", "doc3"]);

        // Nothing was written after the failure point
        assert_eq!(
            store.upsert_calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
        assert_eq!(store.inner.chunk_count("c").await, 0);
    }

    #[tokio::test]
    async fn query_results_are_order_preserving_across_queries() {
        let store = fresh_store(EmbeddingMode::Mpnet).await;
        store
            .upsert(
                vec![doc(Some("doc1"), "refund policy details")],
                None,
                EmbeddingMode::Mpnet,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap();

        let queries = vec![
            Query::new("alpha"),
            Query::new("beta"),
            Query::new("gamma"),
        ];
        let results = store
            .query(queries, EmbeddingMode::Mpnet, &StubEmbedder, "c")
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].query, "alpha");
        assert_eq!(results[1].query, "beta");
        assert_eq!(results[2].query, "gamma");
    }

    #[tokio::test]
    async fn filtered_query_excludes_non_matching_chunks() {
        let store = fresh_store(EmbeddingMode::Mpnet).await;

        let mut file_doc = doc(Some("files"), "refund policy for customers");
        file_doc.metadata.source = Some(Source::File);
        let mut mail_doc = doc(Some("mails"), "refund policy discussion thread");
        mail_doc.metadata.source = Some(Source::Email);

        store
            .upsert(
                vec![file_doc, mail_doc],
                None,
                EmbeddingMode::Mpnet,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap();

        let filter = DocumentMetadataFilter {
            source: Some(Source::File),
            ..Default::default()
        };
        let results = store
            .query(
                vec![Query::new("refund policy").with_filter(filter).with_top_k(10)],
                EmbeddingMode::Mpnet,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap();

        assert!(!results[0].results.is_empty());
        for scored in &results[0].results {
            assert_eq!(scored.chunk.metadata.source, Some(Source::File));
        }
    }

    #[tokio::test]
    async fn delete_all_leaves_no_queryable_chunks() {
        let store = fresh_store(EmbeddingMode::Mpnet).await;
        store
            .upsert(
                vec![
                    doc(Some("doc1"), "first document"),
                    doc(Some("doc2"), "second document"),
                ],
                None,
                EmbeddingMode::Mpnet,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap();

        let success = store.delete(None, None, true, "c").await.unwrap();
        assert!(success);

        let results = store
            .query(
                vec![Query::new("document").with_top_k(10)],
                EmbeddingMode::Mpnet,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap();
        assert!(results[0].results.is_empty());
    }

    #[tokio::test]
    async fn querying_with_wrong_mode_is_rejected() {
        let store = fresh_store(EmbeddingMode::Mpnet).await;

        let err = store
            .query(
                vec![Query::new("hello")],
                EmbeddingMode::Openai,
                &StubEmbedder,
                "c",
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RetrievalError::Store(VectorStoreError::ModeMismatch { .. })
        ));
    }
}
