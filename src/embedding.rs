//! Embedding provider abstraction and the remote OpenAI-compatible client.
//!
//! Defines the [`Embedder`] trait plus [`RemoteEmbedder`], which calls a
//! `POST /v1/embeddings` endpoint. Transient failures (timeouts, rate
//! limits, server errors) are reported distinguishably from permanent
//! ones so the retry policy in [`crate::retry`] can decide what to
//! re-attempt; input-validation failures are never retried.
//!
//! Also provides the vector utilities shared by the index backends:
//! [`cosine_similarity`], [`dot_product`], and the
//! [`vec_to_blob`]/[`blob_to_vec`] BLOB codec for SQLite storage.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Failure classes for a single embedding call.
///
/// [`EmbedError::is_transient`] is the retryable-error predicate handed
/// to the retry policy.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Input validation failed; retrying cannot help.
    #[error("empty input text")]
    EmptyInput,
    /// HTTP 429.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// HTTP 5xx.
    #[error("server error: {0}")]
    Server(String),
    /// Timeout or transport failure before a status was received.
    #[error("network error: {0}")]
    Network(String),
    /// HTTP 4xx other than 429.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl EmbedError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Server(_) | Self::Network(_)
        )
    }
}

/// Maps a text chunk to a fixed-dimension dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Output dimension, fixed at construction and matching the index
    /// namespace this embedder feeds.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a single text (e.g. a retrieval query).
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
        let texts = [text.to_string()];
        let vectors = self.embed_batch(&texts).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Malformed("empty embedding response".into()))
    }
}

/// Embed a batch under the given retry policy.
///
/// Retries only transient failures; exhaustion or a permanent failure
/// surfaces as [`Error::EmbeddingUnavailable`] carrying the last cause.
pub async fn embed_with_retry(
    embedder: &dyn Embedder,
    policy: &RetryPolicy,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    policy
        .run(EmbedError::is_transient, || embedder.embed_batch(texts))
        .await
        .map_err(|e| Error::EmbeddingUnavailable {
            attempts: e.attempts(),
            cause: e.into_inner().to_string(),
        })
}

/// Embedding client for an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl RemoteEmbedder {
    /// Create a client from configuration, reading the API key from the
    /// `OPENAI_API_KEY` environment variable.
    pub fn new(config: &EmbeddingConfig, dims: usize) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY environment variable not set".into()))?;
        Self::with_api_key(config, dims, api_key)
    }

    /// Create a client with an explicit API key.
    pub fn with_api_key(config: &EmbeddingConfig, dims: usize, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Config("embedding.model required".into()))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            dims,
        })
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() || texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbedError::EmptyInput);
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dims,
        });

        let resp = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbedError::Network(format!("timeout: {}", e))
                } else {
                    EmbedError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            let json: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| EmbedError::Malformed(e.to_string()))?;
            return parse_embeddings_response(&json, self.dims);
        }

        let body_text = resp.text().await.unwrap_or_default();
        if status.as_u16() == 429 {
            Err(EmbedError::RateLimited(body_text))
        } else if status.is_server_error() {
            Err(EmbedError::Server(format!("{}: {}", status, body_text)))
        } else {
            Err(EmbedError::Rejected(format!("{}: {}", status, body_text)))
        }
    }
}

/// Extract `data[].embedding` arrays, in input order.
fn parse_embeddings_response(
    json: &serde_json::Value,
    dims: usize,
) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::Malformed("missing data array".into()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbedError::Malformed("missing embedding".into()))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vec.len() != dims {
            return Err(EmbedError::Malformed(format!(
                "expected {} dimensions, got {}",
                dims,
                vec.len()
            )));
        }
        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Construct the embedder named in the config, or fail if disabled.
pub fn create_embedder(config: &EmbeddingConfig, dims: usize) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(RemoteEmbedder::new(config, dims)?)),
        "disabled" => Err(Error::Config(
            "embedding provider is disabled; set [embedding] provider in config".into(),
        )),
        other => Err(Error::Config(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Retry policy for embedding calls, from configuration.
pub fn retry_policy(config: &EmbeddingConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.max_attempts,
        Duration::from_secs(config.base_delay_secs),
        Duration::from_secs(config.max_delay_secs),
    )
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or
/// length-mismatched vectors.
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

/// Plain dot product; `0.0` for length-mismatched vectors.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
