// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Embedding client
//!
//! Converts text to fixed-dimension vectors through a pluggable provider
//! backend, with a bounded FIFO cache, per-item retry, and endpoint rotation.
//!
//! ## Retry policy
//!
//! Up to `max_retries` attempts per text:
//! - transient unavailability (503/429, model warming): linear backoff, same
//!   endpoint
//! - endpoint moved/deprecated (410/404): rotate to the next endpoint
//!   strategy immediately
//! - malformed for the selected pipeline (400): switch once to the
//!   pipeline-specific endpoint variant
//!
//! Failures are per item: one text exhausting its retries never aborts
//! sibling texts in a batch.

pub mod cache;
pub mod provider;

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::errors::EmbeddingError;

pub use cache::{CacheStats, EmbeddingCache};
pub use provider::{
    backend_from_config, BulkBackend, EmbeddingBackend, InferenceBackend, MockEmbedder,
};

/// Cosine similarity between two vectors
///
/// Returns 0.0 when the lengths differ or either norm is zero; never errors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Cache-first embedding client over a provider backend
#[derive(Clone)]
pub struct EmbeddingClient {
    config: EmbeddingConfig,
    backend: Arc<dyn EmbeddingBackend>,
    cache: EmbeddingCache,
}

impl EmbeddingClient {
    /// Build a client for the configured provider kind
    pub fn new(config: EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let backend: Arc<dyn EmbeddingBackend> = Arc::from(backend_from_config(&config)?);
        Ok(Self::with_backend(config, backend))
    }

    /// Build a client around an explicit backend (tests, custom providers)
    pub fn with_backend(config: EmbeddingConfig, backend: Arc<dyn EmbeddingBackend>) -> Self {
        let cache = EmbeddingCache::new(config.cache_max_size);
        Self {
            config,
            backend,
            cache,
        }
    }

    /// Vector dimension produced by the active backend
    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await
    }

    /// Embed one text, cache-first
    ///
    /// The text is trimmed before hashing; an empty result is an
    /// `InvalidInput` error since a query without a vector cannot be used.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let normalized = text.trim();
        if normalized.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "text must be a non-empty string".to_string(),
            ));
        }

        let key = self.cache_key(normalized);
        if let Some(vector) = self.cache.get(&key).await {
            return Ok(vector);
        }

        let vector = self.embed_with_retry(normalized).await?;
        self.cache.put(key, vector.clone()).await;
        Ok(vector)
    }

    /// Embed many texts, best effort
    ///
    /// The result is aligned with the input: failed or empty entries are
    /// `None`, and a failure never aborts sibling texts. Sequential provider
    /// calls are separated by `batch_delay_ms` to respect rate limits; bulk
    /// backends get one call for all cache misses.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

        let mut pending: Vec<(usize, String)> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let normalized = text.trim();
            if normalized.is_empty() {
                continue;
            }
            let key = self.cache_key(normalized);
            match self.cache.get(&key).await {
                Some(vector) => results[i] = Some(vector),
                None => pending.push((i, normalized.to_string())),
            }
        }

        if pending.is_empty() {
            return results;
        }

        if self.backend.supports_bulk() {
            let batch: Vec<String> = pending.iter().map(|(_, text)| text.clone()).collect();
            match self.embed_many_with_retry(&batch).await {
                Ok(vectors) => {
                    for ((i, text), vector) in pending.iter().zip(vectors) {
                        self.cache.put(self.cache_key(text), vector.clone()).await;
                        results[*i] = Some(vector);
                    }
                }
                Err(err) => {
                    warn!(error = %err, batch_size = batch.len(), "bulk embedding call failed, dropping batch");
                }
            }
            return results;
        }

        let last = pending.len() - 1;
        for (seq, (i, text)) in pending.into_iter().enumerate() {
            match self.embed_with_retry(&text).await {
                Ok(vector) => {
                    self.cache.put(self.cache_key(&text), vector.clone()).await;
                    results[i] = Some(vector);
                }
                Err(err) => {
                    warn!(index = i, error = %err, "dropping text from batch after failed embedding");
                }
            }

            if seq < last && self.config.batch_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
        }

        results
    }

    /// Retry loop for one text, walking the backend's endpoint strategies
    ///
    /// Each call gets its own cursor into the strategy list, so concurrent
    /// requests never interfere through shared mutable endpoint state.
    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let endpoints = self.backend.endpoints();
        if endpoints.is_empty() {
            return Err(EmbeddingError::Provider {
                status: None,
                message: "backend exposes no endpoints".to_string(),
            });
        }
        let mut cursor = 0usize;
        let mut on_pipeline_variant = false;

        for attempt in 1..=self.config.max_retries {
            let endpoint = if on_pipeline_variant {
                self.backend
                    .pipeline_endpoint()
                    .unwrap_or_else(|| endpoints[cursor].clone())
            } else {
                endpoints[cursor].clone()
            };

            let err = match self.backend.embed_at(text, &endpoint).await {
                Ok(vector) => return Ok(vector),
                Err(err) => err,
            };

            let final_attempt = attempt == self.config.max_retries;
            if err.is_warming() && !final_attempt {
                let wait = attempt as u64 * self.config.retry_base_delay_ms;
                warn!(
                    attempt,
                    wait_ms = wait,
                    "embedding model unavailable, backing off before retry"
                );
                sleep(Duration::from_millis(wait)).await;
            } else if err.is_endpoint_moved()
                && !on_pipeline_variant
                && cursor + 1 < endpoints.len()
                && !final_attempt
            {
                cursor += 1;
                debug!(endpoint = %endpoints[cursor], "endpoint moved, rotating to next strategy");
            } else if err.is_pipeline_mismatch()
                && !on_pipeline_variant
                && self.backend.pipeline_endpoint().is_some()
                && !final_attempt
            {
                on_pipeline_variant = true;
                debug!("request malformed for selected pipeline, switching to pipeline endpoint");
            } else if matches!(&err, EmbeddingError::Http(e) if e.is_timeout() || e.is_connect())
                && !final_attempt
            {
                let wait = attempt as u64 * self.config.retry_base_delay_ms;
                warn!(attempt, wait_ms = wait, "transport failure, backing off before retry");
                sleep(Duration::from_millis(wait)).await;
            } else {
                return Err(err);
            }
        }

        Err(EmbeddingError::RetriesExhausted {
            attempts: self.config.max_retries,
            message: "all endpoint strategies exhausted".to_string(),
        })
    }

    /// Retry wrapper for one bulk call; only transient failures are retried
    /// since bulk endpoints have a single strategy
    async fn embed_many_with_retry(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let endpoint = self
            .backend
            .endpoints()
            .into_iter()
            .next()
            .unwrap_or_default();

        for attempt in 1..=self.config.max_retries {
            let err = match self.backend.embed_many(texts, &endpoint).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) => err,
            };

            let transient = err.is_warming()
                || matches!(&err, EmbeddingError::Http(e) if e.is_timeout() || e.is_connect());
            if !transient || attempt == self.config.max_retries {
                return Err(err);
            }

            let wait = attempt as u64 * self.config.retry_base_delay_ms;
            warn!(attempt, wait_ms = wait, "bulk embedding call failed, backing off");
            sleep(Duration::from_millis(wait)).await;
        }

        Err(EmbeddingError::RetriesExhausted {
            attempts: self.config.max_retries,
            message: "bulk call retries exhausted".to_string(),
        })
    }

    /// Cache key over (provider, model, normalized text)
    ///
    /// Keying by provider and model means a provider switch misses the cache
    /// instead of serving vectors with the wrong dimension.
    fn cache_key(&self, normalized_text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.backend.provider_id().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.backend.model().as_bytes());
        hasher.update(b"\0");
        hasher.update(normalized_text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
