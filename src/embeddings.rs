//! Embedding providers and the dimension-validating batcher.
//!
//! The provider seam hides where vectors actually come from (an HTTP model
//! server in production, a deterministic mock in tests). The
//! [`EmbeddingBatcher`] owns the pipeline's responsibilities on top of it:
//! one batched call per document and a hard guarantee that every returned
//! vector matches the configured dimension.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use url::Url;

use crate::types::IngestError;

/// Something that can turn a batch of texts into positionally-aligned vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError>;

    /// Display name used in logs.
    fn name(&self) -> &'static str {
        "embedding-provider"
    }
}

/// HTTP embedding provider speaking the common `{"inputs": [...]}` shape.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: Url,
}

#[derive(Debug, serde::Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Bare(Vec<Vec<f32>>),
    Wrapped { embeddings: Vec<Vec<f32>> },
}

impl HttpEmbeddingProvider {
    pub fn new(endpoint: &str) -> Result<Self, IngestError> {
        let endpoint = Url::parse(endpoint).map_err(|err| {
            IngestError::Configuration(format!("invalid embeddings endpoint '{endpoint}': {err}"))
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbedRequest { inputs: texts })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Connectivity(format!(
                "embedding request failed with {status}: {body}"
            )));
        }
        let parsed: EmbedResponse = response.json().await?;
        Ok(match parsed {
            EmbedResponse::Bare(vectors) => vectors,
            EmbedResponse::Wrapped { embeddings } => embeddings,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Deterministic in-process provider for tests and offline runs.
///
/// Vectors are seeded from a stable hash of the input text, so identical
/// texts always embed identically and distinct texts almost never collide.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (0..self.dimension)
            .map(|lane| {
                let mut state = hash ^ (lane as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
                state ^= state >> 33;
                state = state.wrapping_mul(0xff51_afd7_ed55_8ccd);
                state ^= state >> 33;
                ((state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0) as f32
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Batches chunk texts through a provider and validates the output shape.
#[derive(Clone)]
pub struct EmbeddingBatcher {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
}

impl EmbeddingBatcher {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, dimension: usize) -> Self {
        Self {
            provider,
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embeds all texts in one provider call.
    ///
    /// Any vector whose length differs from the configured dimension fails
    /// the whole batch: a mismatch means the deployment is misconfigured,
    /// not that one chunk is bad. Provider failures are logged and
    /// propagated unchanged.
    pub async fn embed_chunks(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.provider.embed_batch(texts).await.inspect_err(|err| {
            warn!(provider = self.provider.name(), error = %err, "embedding batch failed");
        })?;
        if vectors.len() != texts.len() {
            return Err(IngestError::Configuration(format!(
                "embedding provider returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        for (index, vector) in vectors.iter().enumerate() {
            if vector.len() != self.dimension {
                return Err(IngestError::Configuration(format!(
                    "invalid vector size at index {index}: got {}, expected {}",
                    vector.len(),
                    self.dimension
                )));
            }
        }
        Ok(vectors)
    }
}
