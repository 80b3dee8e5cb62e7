//! Remote embedding backend for the OpenAI embeddings API.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::l2_normalize;
use crate::error::EmbeddingError;
use crate::models::OpenAiConfig;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &OpenAiConfig, api_key: String) -> Result<Self, EmbeddingError> {
        if api_key.is_empty() {
            return Err(EmbeddingError::BackendError(
                "OpenAI API key must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    /// Build from config with the key taken from `OPENAI_API_KEY`.
    pub fn from_env(config: &OpenAiConfig) -> Result<Self, EmbeddingError> {
        let api_key = OpenAiConfig::api_key().ok_or_else(|| {
            EmbeddingError::BackendError("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Self::new(config, api_key)
    }

    /// Embed all texts in a single API call.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::BackendError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        // The API documents response order by index; sort rather than trust it
        let mut data = embed_response.data;
        data.sort_by_key(|d| d.index);

        Ok(data
            .into_iter()
            .map(|d| l2_normalize(&d.embedding))
            .collect())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected() {
        let config = OpenAiConfig::default();
        assert!(OpenAiEmbedder::new(&config, String::new()).is_err());
    }

    #[test]
    fn url_trailing_slash_is_trimmed() {
        let config = OpenAiConfig {
            url: "https://api.example.com/v1/embeddings/".to_string(),
            ..Default::default()
        };
        let embedder = OpenAiEmbedder::new(&config, "sk-test".to_string()).unwrap();
        assert_eq!(embedder.url(), "https://api.example.com/v1/embeddings");
    }
}
