// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the RAG core
//!
//! Three error domains, kept separate so callers can match on what they care
//! about:
//! - `EmbeddingError`: provider calls, response envelopes, retry exhaustion
//! - `StoreError`: vector index backend failures
//! - `RagError`: pipeline-level failures surfaced to collaborators

use thiserror::Error;

/// Errors from embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Input text was empty or otherwise unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider returned a non-success HTTP status
    #[error("Provider error (status {status:?}): {message}")]
    Provider { status: Option<u16>, message: String },

    /// Provider response could not be normalized to a flat vector
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Vector length did not match the provider's fixed dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Transport-level HTTP failure (connect, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// All retry attempts and endpoint strategies were exhausted
    #[error("Retries exhausted after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },
}

impl EmbeddingError {
    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            EmbeddingError::Provider { status, .. } => *status,
            EmbeddingError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Transient unavailability (model warming up, rate limited) - retry the
    /// same endpoint after a backoff wait
    pub fn is_warming(&self) -> bool {
        matches!(self.status(), Some(503) | Some(429))
    }

    /// Endpoint moved or deprecated - rotate to the next endpoint strategy
    pub fn is_endpoint_moved(&self) -> bool {
        matches!(self.status(), Some(410) | Some(404))
    }

    /// Request was malformed for the selected pipeline - switch once to the
    /// pipeline-specific endpoint variant
    pub fn is_pipeline_mismatch(&self) -> bool {
        matches!(self.status(), Some(400))
    }

    /// Check if this error is worth retrying at all
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Http(err) => err.is_timeout() || err.is_connect(),
            _ => self.is_warming() || self.is_endpoint_moved() || self.is_pipeline_mismatch(),
        }
    }
}

/// Errors from the vector store backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport-level HTTP failure talking to the index
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend rejected the request or returned an unexpected payload
    #[error("Backend error: {0}")]
    Backend(String),

    /// Payload (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Collection could not be created or fetched
    #[error("Collection unavailable: {0}")]
    CollectionUnavailable(String),
}

impl StoreError {
    /// Connectivity failures flip the client into degraded mode rather than
    /// propagating; genuine write rejections do not
    pub fn is_connectivity(&self) -> bool {
        match self {
            StoreError::Http(err) => err.is_timeout() || err.is_connect(),
            StoreError::CollectionUnavailable(_) => true,
            _ => false,
        }
    }
}

/// Pipeline-level errors exposed to collaborators
///
/// Only failures that make the overall operation meaningless surface here;
/// partial failures inside a batch degrade gracefully and are logged.
#[derive(Error, Debug)]
pub enum RagError {
    /// The query itself could not be embedded, so there is nothing to search
    #[error("Failed to embed query: {0}")]
    QueryEmbedding(#[source] EmbeddingError),

    /// Service construction failed (bad provider configuration)
    #[error("Embedding client setup failed: {0}")]
    Setup(#[from] EmbeddingError),

    /// A genuine (non-degraded) store failure
    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),
}
