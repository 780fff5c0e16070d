// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! RAG service facade
//!
//! Wires the chunker, embedding client and vector store into the operations
//! collaborators actually call: (re)index an artifact, retrieve ranked
//! chunks for a query, assemble prompt context, and cascade deletes. Owns
//! the one-per-process embedding cache through its embedding client.

use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::chunker::{ArtifactBody, ChunkContext, Chunker};
use crate::config::RagConfig;
use crate::context::{assemble_context, OriginalSource};
use crate::embeddings::{CacheStats, EmbeddingClient};
use crate::errors::RagError;
use crate::retriever::{Retriever, RetrieveOptions};
use crate::store::{EmbeddedChunk, ScoredChunk, StoreStats, VectorStoreClient};

/// Result of one artifact (re)indexing run
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub success: bool,
    pub chunks_created: usize,
    pub error: Option<String>,
}

/// Result of a cascading delete
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub chunks_deleted: u64,
}

/// End-to-end chunk/embed/store pipeline plus retrieval
pub struct RagService {
    config: RagConfig,
    chunker: Chunker,
    embeddings: EmbeddingClient,
    store: VectorStoreClient,
}

impl RagService {
    pub fn new(config: RagConfig) -> Result<Self, RagError> {
        let chunker = Chunker::new(config.chunker.clone());
        let embeddings = EmbeddingClient::new(config.embedding.clone())?;
        let store = VectorStoreClient::new(&config.store).map_err(RagError::Store)?;
        Ok(Self {
            config,
            chunker,
            embeddings,
            store,
        })
    }

    /// Build a service around pre-constructed components (tests, custom
    /// backends)
    pub fn with_components(
        config: RagConfig,
        embeddings: EmbeddingClient,
        store: VectorStoreClient,
    ) -> Self {
        Self {
            chunker: Chunker::new(config.chunker.clone()),
            config,
            embeddings,
            store,
        }
    }

    /// Chunk, embed and store one artifact; replace semantics
    ///
    /// Existing chunks for the artifact are deleted first so re-processing
    /// never leaves stale chunks retrievable. Embedding runs in sequential
    /// sub-batches with a pause between them to respect provider rate
    /// limits. `chunks_created` counts chunks actually persisted, so a
    /// degraded store yields `success: true` with zero chunks.
    pub async fn process_artifact(
        &self,
        owner_id: &str,
        artifact_id: &str,
        artifact_type: &str,
        body: Value,
        metadata: Value,
    ) -> ProcessOutcome {
        self.store.delete_by_artifact(artifact_id).await;

        let ctx = ChunkContext::new(owner_id, artifact_id, artifact_type, metadata);
        let parsed = ArtifactBody::from_json(artifact_type, body);
        let records = self.chunker.chunk_artifact(&parsed, &ctx);
        if records.is_empty() {
            return ProcessOutcome {
                success: true,
                chunks_created: 0,
                error: None,
            };
        }

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let batch_size = self.config.embed_batch_size.max(1);
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut batches = texts.chunks(batch_size).peekable();
        while let Some(batch) = batches.next() {
            vectors.extend(self.embeddings.embed_batch(batch).await);
            if batches.peek().is_some() && self.config.embed_batch_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.embed_batch_delay_ms)).await;
            }
        }

        let embedded: Vec<EmbeddedChunk> = records
            .into_iter()
            .zip(vectors)
            .filter_map(|(record, vector)| {
                vector.map(|embedding| EmbeddedChunk { record, embedding })
            })
            .collect();
        if embedded.is_empty() {
            warn!(artifact_id, "no chunks could be embedded, nothing stored");
            return ProcessOutcome {
                success: false,
                chunks_created: 0,
                error: Some("all chunk embeddings failed".to_string()),
            };
        }

        match self.store.add_chunks(&embedded).await {
            Ok(ids) => {
                info!(
                    artifact_id,
                    artifact_type,
                    chunks = ids.len(),
                    "artifact indexed"
                );
                ProcessOutcome {
                    success: true,
                    chunks_created: ids.len(),
                    error: None,
                }
            }
            Err(err) => {
                // Store rejections degrade the indexing, not the caller's
                // content pipeline
                warn!(artifact_id, error = %err, "failed to store artifact chunks");
                ProcessOutcome {
                    success: false,
                    chunks_created: 0,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Retrieve ranked chunks for a query scoped to one owner
    pub async fn retrieve(
        &self,
        owner_id: &str,
        query: &str,
        options: &RetrieveOptions,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        Retriever::new(&self.embeddings, &self.store)
            .retrieve(owner_id, query, options)
            .await
    }

    /// Format retrieved chunks and session material into one prompt block
    pub fn assemble_context(
        &self,
        chunks: &[ScoredChunk],
        current_session: &BTreeMap<String, Value>,
        original_source: Option<&OriginalSource>,
    ) -> String {
        assemble_context(chunks, current_session, original_source)
    }

    /// Delete every stored chunk for one artifact
    pub async fn delete_artifact(&self, artifact_id: &str) -> DeleteOutcome {
        DeleteOutcome {
            chunks_deleted: self.store.delete_by_artifact(artifact_id).await,
        }
    }

    /// Delete every stored chunk for one owner
    pub async fn delete_owner(&self, owner_id: &str) -> DeleteOutcome {
        DeleteOutcome {
            chunks_deleted: self.store.delete_by_owner(owner_id).await,
        }
    }

    /// Whether the vector store is currently reachable
    pub async fn is_available(&self) -> bool {
        self.store.is_available().await
    }

    /// Best-effort vector store statistics
    pub async fn store_stats(&self) -> StoreStats {
        self.store.stats().await
    }

    /// Embedding cache occupancy and hit counters
    pub async fn cache_stats(&self) -> CacheStats {
        self.embeddings.cache_stats().await
    }

    /// Drop all cached embeddings
    pub async fn clear_cache(&self) {
        self.embeddings.clear_cache().await
    }
}
