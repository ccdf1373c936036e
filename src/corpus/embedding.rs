//! Embedding Backends
//!
//! Dense relevance keys for the embedding representation:
//! - `hashing`: deterministic local feature hashing, no network
//! - `ollama`: local inference server (`/api/embed`)
//! - `openai`: any OpenAI-compatible host (`/embeddings`)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::lexical::tokenize;
use crate::ai::provider::validate_endpoint;
use crate::config::EmbeddingConfig;
use crate::constants::corpus::HASH_NGRAM;
use crate::constants::network::{OLLAMA_DEFAULT_ENDPOINT, OPENAI_DEFAULT_ENDPOINT};
use crate::types::{PaperdocError, Result};

/// Turns texts into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Model identity; also the embedding cache namespace
    fn model(&self) -> &str;

    /// Whether vectors cost a network call (and are worth caching)
    fn is_remote(&self) -> bool {
        true
    }

    /// One vector per input text, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Build the embedder named by configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.to_lowercase().as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dims))),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => Err(PaperdocError::Config(format!(
            "Unknown embedding provider: {}. Valid values: hashing, ollama, openai",
            other
        ))),
    }
}

/// Cosine similarity in `[-1, 1]`; 0 for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PaperdocError::Embedding(format!("Failed to create HTTP client: {}", e)))
}

async fn error_body(response: reqwest::Response, backend: &str) -> PaperdocError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    PaperdocError::Embedding(format!("{} embedding error ({}): {}", backend, status, body))
}

// =============================================================================
// Hashing
// =============================================================================

/// Feature-hashing embedder.
///
/// Words and character n-grams of each word are hashed (crc32) into
/// `dims` signed buckets and the result is L2-normalized, so texts that
/// share vocabulary land close together.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
    model: String,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            model: format!("hashing-{}", dims),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];

        for token in tokenize(text) {
            self.add_feature(&mut vector, token.as_bytes(), 1.0);

            let padded: Vec<char> = format!("#{}#", token).chars().collect();
            if padded.len() > HASH_NGRAM {
                for window in padded.windows(HASH_NGRAM) {
                    let gram: String = window.iter().collect();
                    self.add_feature(&mut vector, gram.as_bytes(), 0.5);
                }
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = crc32fast::hash(feature);
        let bucket = hash as usize % self.dims;
        let sign = if hash & 0x8000_0000 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// =============================================================================
// Ollama
// =============================================================================

pub struct OllamaEmbedder {
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            api_base: validate_endpoint(&api_base, "Ollama")?,
            model: config.model.clone(),
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.api_base);
        debug!(model = %self.model, count = texts.len(), "Requesting Ollama embeddings");

        let response = self
            .client
            .post(&url)
            .json(&OllamaEmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| PaperdocError::Embedding(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(error_body(response, "Ollama").await);
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|e| {
            PaperdocError::Embedding(format!("Failed to parse Ollama response: {}", e))
        })?;
        Ok(body.embeddings)
    }
}

// =============================================================================
// OpenAI
// =============================================================================

pub struct OpenAiEmbedder {
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                PaperdocError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY env var or corpus.embedding.api_key"
                        .to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| OPENAI_DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base: validate_endpoint(&api_base, "OpenAI")?,
            model: config.model.clone(),
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.api_base);
        debug!(model = %self.model, count = texts.len(), "Requesting OpenAI embeddings");

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&OpenAiEmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| PaperdocError::Embedding(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(error_body(response, "OpenAI").await);
        }

        let mut body: OpenAiEmbedResponse = response.json().await.map_err(|e| {
            PaperdocError::Embedding(format!("Failed to parse OpenAI response: {}", e))
        })?;
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let texts = vec!["merge sort on linked lists".to_string()];
        let a = embedder.embed(&texts).await.unwrap();
        let b = embedder.embed(&texts).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
        let norm: f32 = a[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_similarity_tracks_vocabulary() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed_one("dijkstra shortest path");
        let near = embedder.embed_one("shortest path search with dijkstra's algorithm");
        let far = embedder.embed_one("singular value decomposition of matrices");

        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }

    #[test]
    fn test_hashing_embedder_empty_text_is_zero_vector() {
        let v = HashingEmbedder::new(8).embed_one("");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_create_embedder_by_name() {
        let config = EmbeddingConfig::default();
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.name(), "hashing");
        assert!(!embedder.is_remote());

        let bad = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&bad).is_err());
    }
}
