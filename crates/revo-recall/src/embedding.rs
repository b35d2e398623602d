use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use revo_config::{EmbeddingBackendKind, RevoConfig};
use revo_core::AppError;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::similarity::l2_normalize;

const TRIGRAM_WEIGHT: f32 = 0.5;

/// Turns text into a fixed-length vector for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimensions(&self) -> usize;
    /// Backend that produced the most recent vectors.
    fn backend(&self) -> EmbeddingBackendKind;
}

/// Hash-bucket pseudo-embedding.
///
/// Each lowercase alphanumeric token and each of its padded character
/// trigrams is hashed into a signed bucket; the result is L2-normalised.
/// Deterministic and dependency-free, so it is always available.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            self.add_feature(&mut vector, &token, 1.0);

            let padded: Vec<char> = format!("#{token}#").chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, &trigram, TRIGRAM_WEIGHT);
            }
        }
        l2_normalize(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn backend(&self) -> EmbeddingBackendKind {
        EmbeddingBackendKind::Hash
    }
}

/// OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug)]
pub struct ApiEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    client: reqwest::Client,
}

impl ApiEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for ApiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model, "input": text }));
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("embedding request failed for model {}", self.model))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read embedding response body")?;
        if !status.is_success() {
            return Err(anyhow!(
                "embedding request failed for model {}: status {status}, body {body}",
                self.model
            ));
        }

        let vector = parse_embedding_response(&body)?;
        if vector.len() != self.dimensions {
            return Err(AppError::InvalidEmbeddingDimensions {
                expected: self.dimensions,
                actual: vector.len(),
            }
            .into());
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn backend(&self) -> EmbeddingBackendKind {
        EmbeddingBackendKind::Api
    }
}

/// Tries `primary`, degrading to hash embeddings on any failure.
///
/// The caller is never failed; `backend()` reports `Hash` while the last call
/// fell back.
pub struct FallbackEmbedder {
    primary: Box<dyn Embedder>,
    fallback: HashEmbedder,
    degraded: AtomicBool,
}

impl FallbackEmbedder {
    pub fn new(primary: Box<dyn Embedder>) -> Self {
        let fallback = HashEmbedder::new(primary.dimensions());
        Self {
            primary,
            fallback,
            degraded: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Embedder for FallbackEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match self.primary.embed(text).await {
            Ok(vector) if vector.len() == self.fallback.dimensions() => {
                self.degraded.store(false, Ordering::Relaxed);
                Ok(vector)
            }
            Ok(vector) => {
                warn!(
                    expected = self.fallback.dimensions(),
                    actual = vector.len(),
                    "embedding dimension mismatch, using hash embeddings"
                );
                self.degraded.store(true, Ordering::Relaxed);
                Ok(self.fallback.embed_sync(text))
            }
            Err(error) => {
                let reason = format!("{error:#}");
                warn!(%reason, "embedding backend unavailable, using hash embeddings");
                self.degraded.store(true, Ordering::Relaxed);
                Ok(self.fallback.embed_sync(text))
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.fallback.dimensions()
    }

    fn backend(&self) -> EmbeddingBackendKind {
        if self.degraded.load(Ordering::Relaxed) {
            EmbeddingBackendKind::Hash
        } else {
            self.primary.backend()
        }
    }
}

/// Embedder selected by `[recall] embedding`.
pub fn build_embedder(config: &RevoConfig) -> Arc<dyn Embedder> {
    let dimensions = config.recall.embedding_dimensions;
    match config.recall.embedding {
        EmbeddingBackendKind::Hash => Arc::new(HashEmbedder::new(dimensions)),
        EmbeddingBackendKind::Api => {
            let api = ApiEmbedder::new(
                config.llm.base_url.clone(),
                config.llm.api_key.clone(),
                config.llm.embedding_model.clone(),
                dimensions,
            );
            Arc::new(FallbackEmbedder::new(Box::new(api)))
        }
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

fn parse_embedding_response(body: &str) -> Result<Vec<f32>> {
    let value: Value =
        serde_json::from_str(body).context("failed to parse embedding response JSON")?;
    let values = value
        .get("data")
        .and_then(|data| data.get(0))
        .and_then(|item| item.get("embedding"))
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("missing data[0].embedding in embedding response"))?;

    values
        .iter()
        .map(|number| {
            number
                .as_f64()
                .map(|n| n as f32)
                .ok_or_else(|| anyhow!("non-numeric value in embedding response"))
        })
        .collect()
}
