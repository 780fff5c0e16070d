// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Retrieval-augmented generation core
//!
//! Deterministic chunking of content artifacts, embedding generation with a
//! bounded cache and provider retry/rotation, a vector store client with
//! graceful degradation, ranked retrieval, and prompt context assembly.
//!
//! The top-level entry point is [`RagService`]; the individual components
//! are public for callers that need finer control.

pub mod chunker;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod retriever;
pub mod service;
pub mod store;

// Re-export the main pipeline types
pub use chunker::{ArtifactBody, ChunkContext, ChunkRecord, Chunker, Flashcard, QaItem, Slide};
pub use config::{
    ChunkerConfig, EmbeddingConfig, ProviderKind, RagConfig, StoreBackendKind, StoreConfig,
};
pub use context::{assemble_context, OriginalSource};
pub use embeddings::{
    cosine_similarity, CacheStats, EmbeddingBackend, EmbeddingCache, EmbeddingClient, MockEmbedder,
};
pub use errors::{EmbeddingError, RagError, StoreError};
pub use retriever::{RetrieveOptions, Retriever};
pub use service::{DeleteOutcome, ProcessOutcome, RagService};
pub use store::{
    EmbeddedChunk, MemoryBackend, QueryFilters, ScoredChunk, StoreBackend, StoreStats,
    VectorStoreClient,
};
