//! Embedding backend selection and dispatch.
//!
//! The orchestration core depends only on [`TextEmbedder`]; [`Embedders`] is
//! the production implementation that routes a batch to the remote OpenAI
//! backend or the local MPNet ONNX model based on the collection's
//! [`EmbeddingMode`].

mod local;
mod openai;

pub use local::LocalEmbedder;
pub use openai::OpenAiEmbedder;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{EmbeddingError, RetrievalError};
use crate::models::EmbeddingMode;
use crate::utils::retry::{RetryConfig, RetryResult, with_retry};

/// Text sequence to vector sequence, under a selectable backend.
///
/// Implementations must return exactly one L2-normalized vector per input
/// text and must embed the whole batch in a single backend invocation.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(
        &self,
        texts: &[String],
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Process-wide embedding backend handles, initialized once at startup and
/// treated as read-only by the pipeline.
pub struct Embedders {
    openai: OpenAiEmbedder,
    local: Option<Arc<LocalEmbedder>>,
}

impl Embedders {
    pub fn new(openai: OpenAiEmbedder, local: Option<LocalEmbedder>) -> Self {
        Self {
            openai,
            local: local.map(Arc::new),
        }
    }

    pub fn has_local_model(&self) -> bool {
        self.local.is_some()
    }
}

#[async_trait]
impl TextEmbedder for Embedders {
    async fn embed(
        &self,
        texts: &[String],
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(mode = %mode, batch = texts.len(), "embedding batch");

        let vectors = match mode {
            EmbeddingMode::Openai => self.openai.embed_batch(texts).await?,
            EmbeddingMode::Mpnet => {
                let local = self.local.clone().ok_or(EmbeddingError::ModelNotLoaded)?;
                let texts = texts.to_vec();
                // ONNX inference is CPU-bound; keep it off the async workers
                tokio::task::spawn_blocking(move || local.embed(&texts))
                    .await
                    .map_err(|e| {
                        EmbeddingError::BackendError(format!("embedding task panicked: {}", e))
                    })??
            }
        };

        ensure_full_batch(texts.len(), vectors)
    }
}

/// Enforce one vector per input text: a short (or long) batch is an error,
/// never a partial result.
fn ensure_full_batch(
    sent: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.len() != sent {
        return Err(EmbeddingError::BatchMismatch {
            sent,
            received: vectors.len(),
        });
    }
    Ok(vectors)
}

/// Embed a batch under the bounded retry policy (3 attempts, randomized
/// exponential backoff between 1s and 20s). Exhausting the budget fails the
/// whole batch; partial results are never returned.
pub async fn embed_with_retry(
    embedder: &dyn TextEmbedder,
    texts: &[String],
    mode: EmbeddingMode,
) -> Result<Vec<Vec<f32>>, RetrievalError> {
    match with_retry(&RetryConfig::embedding(), || embedder.embed(texts, mode)).await {
        RetryResult::Success(vectors) => Ok(vectors),
        RetryResult::Failed {
            last_error,
            attempts,
        } => Err(RetrievalError::EmbeddingUnavailable {
            attempts,
            source: last_error,
        }),
    }
}

/// L2-normalize a vector; zero vectors are returned unchanged.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingEmbedder;

    #[async_trait]
    impl TextEmbedder for FailingEmbedder {
        async fn embed(
            &self,
            _texts: &[String],
            _mode: EmbeddingMode,
        ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            // Not retryable, so the retry wrapper fails after one attempt
            Err(EmbeddingError::InvalidResponse("boom".to_string()))
        }
    }

    #[test]
    fn short_batch_is_an_error_not_a_partial_result() {
        use crate::utils::Retryable;

        let err = ensure_full_batch(3, vec![vec![1.0, 0.0]]).unwrap_err();
        match &err {
            EmbeddingError::BatchMismatch { sent, received } => {
                assert_eq!(*sent, 3);
                assert_eq!(*received, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // A mismatched batch never fixes itself on retry
        assert!(!err.is_retryable());
    }

    #[test]
    fn full_batch_passes_through_unchanged() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert_eq!(ensure_full_batch(2, vectors.clone()).unwrap(), vectors);
        assert!(ensure_full_batch(0, Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn has_local_model_reflects_configuration() {
        let openai =
            OpenAiEmbedder::new(&crate::models::OpenAiConfig::default(), "sk-test".to_string())
                .unwrap();
        let embedders = Embedders::new(openai, None);
        assert!(!embedders.has_local_model());
    }

    #[test]
    fn l2_normalize_produces_unit_vectors() {
        let v = l2_normalize(&[3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_alone() {
        assert_eq!(l2_normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_embedding_unavailable() {
        let texts = vec!["hello".to_string()];
        let err = embed_with_retry(&FailingEmbedder, &texts, EmbeddingMode::Mpnet)
            .await
            .unwrap_err();
        match err {
            RetrievalError::EmbeddingUnavailable { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
