//! Local MPNet embedding backend running on ONNX Runtime.

use std::path::Path;
use std::sync::Mutex;

use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};

use super::l2_normalize;
use crate::error::ModelError;
use crate::models::{EmbeddingMode, LocalModelConfig};

/// all-mpnet-base-v2 sentence embedder: tokenize, run the transformer, mean
/// pool over the attention mask, L2-normalize.
pub struct LocalEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
}

impl LocalEmbedder {
    pub fn load(config: &LocalModelConfig) -> Result<Self, ModelError> {
        let model_dir = config
            .model_dir
            .as_deref()
            .ok_or_else(|| ModelError::NotFound("local model_dir is not configured".to_string()))?;
        Self::load_from_dir(model_dir, config.max_tokens as usize)
    }

    pub fn load_from_dir(model_dir: &Path, max_tokens: usize) -> Result<Self, ModelError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(ModelError::NotFound(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        // Truncate long texts to the model's context window
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        // Pad to the longest sequence in the batch
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: EmbeddingMode::Mpnet.dimension() as usize,
        })
    }

    /// Embed a batch of texts in one forward pass.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for (j, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[i * max_len + j] = id as i64;
                attention_mask[i * max_len + j] = m as i64;
            }
        }

        let input_ids_tensor = Tensor::from_array(([batch_size, max_len], input_ids))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array(([batch_size, max_len], attention_mask))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![input_ids_tensor, attention_mask_tensor])
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        // last_hidden_state: [batch, seq, hidden]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        if shape.len() != 3 {
            return Err(ModelError::InferenceError(format!(
                "unexpected output shape: {:?}",
                shape
            )));
        }
        let seq_len = shape[1] as usize;
        let hidden = shape[2] as usize;
        if hidden != self.dimension {
            return Err(ModelError::InferenceError(format!(
                "unexpected hidden size {} (expected {})",
                hidden, self.dimension
            )));
        }

        let embeddings = encodings
            .iter()
            .enumerate()
            .map(|(i, encoding)| {
                let pooled = mean_pool(data, i, seq_len, hidden, encoding.get_attention_mask());
                l2_normalize(&pooled)
            })
            .collect();

        Ok(embeddings)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Average the token embeddings of one sequence, weighted by its attention
/// mask so padding does not dilute the result.
fn mean_pool(data: &[f32], row: usize, seq_len: usize, hidden: usize, mask: &[u32]) -> Vec<f32> {
    let mut sum = vec![0f32; hidden];
    let mut count = 0f32;

    for t in 0..seq_len.min(mask.len()) {
        if mask[t] == 0 {
            continue;
        }
        count += 1.0;
        let base = (row * seq_len + t) * hidden;
        for (d, s) in sum.iter_mut().enumerate() {
            *s += data[base + d];
        }
    }

    if count > 0.0 {
        for s in &mut sum {
            *s /= count;
        }
    }
    sum
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_pool_respects_attention_mask() {
        // batch=1, seq=3, hidden=2; third position is padding
        let data = [1.0, 2.0, 3.0, 4.0, 100.0, 100.0];
        let mask = [1u32, 1, 0];
        let pooled = mean_pool(&data, 0, 3, 2, &mask);
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[test]
    fn mean_pool_of_empty_mask_is_zero() {
        let data = [1.0, 2.0];
        let pooled = mean_pool(&data, 0, 1, 2, &[0u32]);
        assert_eq!(pooled, vec![0.0, 0.0]);
    }

    #[test]
    fn missing_model_dir_fails_to_load() {
        let config = LocalModelConfig::default();
        assert!(LocalEmbedder::load(&config).is_err());
    }
}
