// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for the RAG pipeline
//!
//! Each component carries its own config struct with working defaults; the
//! top-level `RagConfig` bundles them and can be built from environment
//! variables for deployments.

use serde::{Deserialize, Serialize};

/// Which embedding provider shape to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Bulk API: many inputs per call, hard dimension guarantee (OpenAI-style)
    Bulk,
    /// Single-input inference API with loose response envelopes (Hugging
    /// Face-style)
    Inference,
    /// Deterministic local vectors, no network (tests and offline use)
    Mock,
}

impl ProviderKind {
    /// Stable identifier used as part of the embedding cache key
    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::Bulk => "bulk",
            ProviderKind::Inference => "inference",
            ProviderKind::Mock => "mock",
        }
    }
}

/// Chunker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Target window size in characters
    pub chunk_size: usize,
    /// Backward overlap between consecutive windows
    pub chunk_overlap: usize,
    /// Chunks shorter than this are dropped
    pub min_chunk_size: usize,
    /// Hard cap per artifact; remaining text past this is discarded
    pub max_chunks: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 150,
            min_chunk_size: 100,
            max_chunks: 50,
        }
    }
}

/// Embedding client tuning
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    /// Provider model identifier
    pub model: String,
    /// Fixed vector dimension for the configured model
    pub dimension: usize,
    pub api_key: Option<String>,
    /// Override the provider base URL (self-hosted gateways, tests)
    pub base_url: Option<String>,
    /// Per-call timeout; model cold starts can take tens of seconds
    pub timeout_ms: u64,
    /// Attempts per text, counting endpoint rotations
    pub max_retries: u32,
    /// Linear backoff unit: attempt N waits N * this
    pub retry_base_delay_ms: u64,
    /// Fixed pause between sequential provider calls in a batch
    pub batch_delay_ms: u64,
    /// FIFO cache bound
    pub cache_max_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Inference,
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            api_key: None,
            base_url: None,
            timeout_ms: 60_000,
            max_retries: 3,
            retry_base_delay_ms: 2_000,
            batch_delay_ms: 200,
            cache_max_size: 1_000,
        }
    }
}

impl EmbeddingConfig {
    /// Bulk-provider defaults (OpenAI text-embedding-3-small, 1536 dims)
    pub fn bulk(api_key: Option<String>) -> Self {
        Self {
            provider: ProviderKind::Bulk,
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            api_key,
            ..Self::default()
        }
    }

    /// Mock-provider defaults for tests and offline development
    pub fn mock() -> Self {
        Self {
            provider: ProviderKind::Mock,
            model: "mock-embedder".to_string(),
            batch_delay_ms: 0,
            ..Self::default()
        }
    }
}

/// Which vector store backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendKind {
    /// Chroma-style REST backend
    Http,
    /// In-memory backend (tests, offline development)
    Memory,
}

/// Vector store client tuning
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,
    pub url: String,
    pub collection: String,
    /// Expected vector dimension; chunks that disagree are rejected before
    /// storage
    pub dimension: usize,
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Http,
            url: "http://localhost:8000".to_string(),
            collection: "rag_chunks".to_string(),
            dimension: 384,
            timeout_ms: 5_000,
        }
    }
}

/// Top-level pipeline configuration
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub chunker: ChunkerConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    /// Chunks embedded per sub-batch during artifact processing
    pub embed_batch_size: usize,
    /// Pause between sub-batches
    pub embed_batch_delay_ms: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            embed_batch_size: 5,
            embed_batch_delay_ms: 500,
        }
    }
}

impl RagConfig {
    /// Build a config from environment variables
    ///
    /// - `EMBEDDING_PROVIDER`: "openai", "huggingface" (default) or "mock"
    /// - `OPENAI_API_KEY` / `HUGGINGFACE_API_KEY`: provider credentials
    /// - `VECTOR_DB_URL`: vector index endpoint (default http://localhost:8000)
    /// - `VECTOR_DB_COLLECTION`: collection name (default rag_chunks)
    pub fn from_env() -> Self {
        let embedding = match std::env::var("EMBEDDING_PROVIDER").as_deref() {
            Ok("openai") => EmbeddingConfig::bulk(std::env::var("OPENAI_API_KEY").ok()),
            Ok("mock") => EmbeddingConfig::mock(),
            _ => EmbeddingConfig {
                api_key: std::env::var("HUGGINGFACE_API_KEY").ok(),
                ..EmbeddingConfig::default()
            },
        };

        let store = StoreConfig {
            url: std::env::var("VECTOR_DB_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            collection: std::env::var("VECTOR_DB_COLLECTION")
                .unwrap_or_else(|_| "rag_chunks".to_string()),
            dimension: embedding.dimension,
            ..StoreConfig::default()
        };

        Self {
            embedding,
            store,
            ..Self::default()
        }
    }
}
