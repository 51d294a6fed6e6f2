//! Text embedding providers
//!
//! `hashing` embeds locally with signed feature hashing over word tokens;
//! `ollama` calls a local Ollama server's `/api/embed` endpoint.

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::errors::{ModelError, ModelResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding providers that convert text to vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> ModelResult<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::EmbeddingFailed {
                reason: format!("{} returned no embedding", self.model_name()),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> ModelResult<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Build the configured provider, `None` when embeddings are disabled
pub fn build_provider(config: &EmbeddingConfig) -> Option<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderKind::Hashing => Some(Arc::new(HashingEmbedder::new(
            config.model.clone(),
            config.dimensions,
        ))),
        EmbeddingProviderKind::Ollama => Some(Arc::new(OllamaEmbedder::new(
            config.model.clone(),
            config.endpoint.clone(),
            config.dimensions,
            Duration::from_secs(config.request_timeout_secs),
        ))),
        EmbeddingProviderKind::Disabled => None,
    }
}

/// Deterministic local embedder
///
/// Each lower-cased word token is hashed to a bucket and a sign; the
/// resulting count vector is L2-normalized.
pub struct HashingEmbedder {
    model: String,
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims: dims.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2)
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> ModelResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama embedding provider
pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub fn new(model: String, endpoint: String, dims: usize, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            dims,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> ModelResult<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.endpoint);
        let request = OllamaEmbeddingRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::unavailable("ollama-embed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::EmbeddingFailed {
                reason: format!("Ollama API error {status}: {body}"),
            });
        }

        let result: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ModelError::EmbeddingFailed {
                reason: e.to_string(),
            })?;

        if result.embeddings.len() != texts.len() {
            return Err(ModelError::EmbeddingFailed {
                reason: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    result.embeddings.len()
                ),
            });
        }
        Ok(result.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new("hashing-384", 384);
        let a = embedder.embed_sync("KfW 270 loan for solar installations");
        let b = embedder.embed_sync("KfW 270 loan for solar installations");
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new("hashing-16", 16);
        assert!(embedder.embed_sync("  ").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_disabled_provider_builds_nothing() {
        let mut config = crate::config::AppConfig::default().rag.embedding;
        config.provider = EmbeddingProviderKind::Disabled;
        assert!(build_provider(&config).is_none());

        config.provider = EmbeddingProviderKind::Hashing;
        let provider = build_provider(&config).unwrap();
        let v = provider.embed("feed-in tariff").await.unwrap();
        assert_eq!(v.len(), provider.dimensions());
    }

    #[tokio::test]
    async fn test_unreachable_ollama_is_unavailable() {
        let embedder = OllamaEmbedder::new(
            "nomic-embed-text".to_string(),
            "http://127.0.0.1:9".to_string(),
            768,
            Duration::from_millis(500),
        );
        assert!(matches!(
            embedder.embed("hello").await,
            Err(ModelError::Unavailable { .. })
        ));
    }
}
