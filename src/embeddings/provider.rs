// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Embedding provider backends
//!
//! Two network shapes plus a deterministic mock:
//! - `BulkBackend`: many inputs per call, fixed-size vectors with a hard
//!   dimension guarantee (OpenAI-style)
//! - `InferenceBackend`: one input per call; the response envelope may be a
//!   flat vector or an array of vectors and is normalized before use
//! - `MockEmbedder`: SHA-256-seeded unit vectors, no network
//!
//! Endpoint rotation is modeled as an ordered strategy list the client walks
//! per call; backends never mutate shared state on failure.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::errors::EmbeddingError;

/// Provider seam for the embedding client
///
/// Implementations are stateless per call; the client owns retry policy and
/// caching.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Stable provider identifier, part of the cache key
    fn provider_id(&self) -> &str;

    fn model(&self) -> &str;

    /// Fixed vector dimension this backend produces
    fn dimension(&self) -> usize;

    /// Ordered endpoint strategies, tried in sequence on moved/deprecated
    /// responses. Must return at least one endpoint; an empty list fails the
    /// embed call.
    fn endpoints(&self) -> Vec<String>;

    /// Pipeline-specific endpoint variant, tried once when the default shape
    /// is rejected as malformed
    fn pipeline_endpoint(&self) -> Option<String> {
        None
    }

    /// Embed a single text at the given endpoint
    async fn embed_at(&self, text: &str, endpoint: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed many texts in one call; sequential fallback for backends without
    /// a bulk API
    async fn embed_many(
        &self,
        texts: &[String],
        endpoint: &str,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_at(text, endpoint).await?);
        }
        Ok(vectors)
    }

    /// Whether `embed_many` is a single provider call
    fn supports_bulk(&self) -> bool {
        false
    }
}

/// Build the backend matching the configured provider kind
pub fn backend_from_config(
    config: &EmbeddingConfig,
) -> Result<Box<dyn EmbeddingBackend>, EmbeddingError> {
    match config.provider {
        ProviderKind::Inference => Ok(Box::new(InferenceBackend::new(config)?)),
        ProviderKind::Bulk => Ok(Box::new(BulkBackend::new(config)?)),
        ProviderKind::Mock => Ok(Box::new(MockEmbedder::new(config))),
    }
}

/// Flatten a loose response envelope to a single vector
///
/// Accepts a flat array of numbers or an array of vectors (first row taken).
/// Anything else is treated as malformed and discarded.
pub(crate) fn normalize_envelope(value: &Value) -> Option<Vec<f32>> {
    let arr = value.as_array()?;
    if arr.is_empty() {
        return None;
    }
    let flat = if arr[0].is_array() {
        arr[0].as_array()?
    } else {
        arr
    };
    if flat.is_empty() {
        return None;
    }
    flat.iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
}

async fn error_for_status(response: reqwest::Response) -> EmbeddingError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    let message = if message.chars().count() > 300 {
        message.chars().take(300).collect()
    } else {
        message
    };
    EmbeddingError::Provider {
        status: Some(status),
        message,
    }
}

/// Single-input inference API backend (Hugging Face shape)
pub struct InferenceBackend {
    model: String,
    dimension: usize,
    api_key: Option<String>,
    http: Client,
    endpoints: Vec<String>,
    pipeline_endpoint: String,
}

impl InferenceBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let (endpoints, pipeline_endpoint) = match &config.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                (
                    vec![format!("{}/models/{}", base, config.model)],
                    format!("{}/pipeline/feature-extraction/{}", base, config.model),
                )
            }
            None => (
                vec![
                    format!(
                        "https://api-inference.huggingface.co/models/{}",
                        config.model
                    ),
                    format!(
                        "https://router.huggingface.co/hf-inference/models/{}",
                        config.model
                    ),
                ],
                format!(
                    "https://router.huggingface.co/hf-inference/pipeline/feature-extraction/{}",
                    config.model
                ),
            ),
        };

        Ok(Self {
            model: config.model.clone(),
            dimension: config.dimension,
            api_key: config.api_key.clone(),
            http,
            endpoints,
            pipeline_endpoint,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for InferenceBackend {
    fn provider_id(&self) -> &str {
        ProviderKind::Inference.id()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.clone()
    }

    fn pipeline_endpoint(&self) -> Option<String> {
        Some(self.pipeline_endpoint.clone())
    }

    async fn embed_at(&self, text: &str, endpoint: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut request = self.http.post(endpoint).json(&json!({ "inputs": text }));
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let body: Value = response.json().await?;
        normalize_envelope(&body).ok_or_else(|| {
            EmbeddingError::MalformedResponse(format!(
                "response is not a vector or array of vectors: {}",
                truncate_debug(&body)
            ))
        })
    }
}

/// Bulk embedding API backend (OpenAI shape)
pub struct BulkBackend {
    model: String,
    dimension: usize,
    api_key: Option<String>,
    http: Client,
    url: String,
}

#[derive(Deserialize)]
struct BulkResponse {
    data: Vec<BulkItem>,
}

#[derive(Deserialize)]
struct BulkItem {
    embedding: Vec<f32>,
}

impl BulkBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let base = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            model: config.model.clone(),
            dimension: config.dimension,
            api_key: config.api_key.clone(),
            http,
            url: format!("{}/embeddings", base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl EmbeddingBackend for BulkBackend {
    fn provider_id(&self) -> &str {
        ProviderKind::Bulk.id()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn endpoints(&self) -> Vec<String> {
        vec![self.url.clone()]
    }

    async fn embed_at(&self, text: &str, endpoint: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_many(&[text.to_string()], endpoint).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::MalformedResponse("empty data array".to_string()))
    }

    async fn embed_many(
        &self,
        texts: &[String],
        endpoint: &str,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut request = self.http.post(endpoint).json(&json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dimension,
        }));
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let body: BulkResponse = response.json().await?;
        // Bulk providers guarantee the dimension; enforce it anyway so a bad
        // vector never reaches storage
        for item in &body.data {
            if item.embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: item.embedding.len(),
                });
            }
        }
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }

    fn supports_bulk(&self) -> bool {
        true
    }
}

/// Deterministic offline embedder
///
/// Produces unit-norm vectors seeded from a SHA-256 of the input, so equal
/// texts always embed identically. Used in tests and offline development.
pub struct MockEmbedder {
    model: String,
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            model: config.model.clone(),
            dimension: config.dimension,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbedder {
    fn provider_id(&self) -> &str {
        ProviderKind::Mock.id()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn endpoints(&self) -> Vec<String> {
        vec!["mock://embed".to_string()]
    }

    async fn embed_at(&self, text: &str, _endpoint: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let hash = hasher.finalize();

        let mut vector = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            let byte = hash[i % hash.len()];
            // Mix in the position so the vector is not a repeating pattern
            let mixed = byte.wrapping_add((i / hash.len()) as u8);
            vector.push((mixed as f32 / 255.0) * 2.0 - 1.0);
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn supports_bulk(&self) -> bool {
        true
    }
}

fn truncate_debug(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() > 200 {
        let clipped: String = rendered.chars().take(200).collect();
        format!("{clipped}...")
    } else {
        rendered
    }
}
