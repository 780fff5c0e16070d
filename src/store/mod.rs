// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vector store client
//!
//! Thin client over the vector index: upsert, metadata-filtered similarity
//! query, delete-by-artifact/owner, and stats. The key resilience property
//! lives here: if the backing index is unreachable the client flips into
//! degraded mode and every operation becomes a safe no-op (empty results,
//! zero counts) instead of an error. The RAG path is optional infrastructure
//! and must never take the rest of the product down with it.

pub mod backend;

use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::chunker::ChunkRecord;
use crate::config::{StoreBackendKind, StoreConfig};
use crate::errors::StoreError;

pub use backend::{BackendHit, HttpBackend, MemoryBackend, StoreBackend, StoredEntry};

/// Similarity assumed when the backend returns a hit without a distance.
/// A heuristic carried over from the original service, not a guarantee.
const DEFAULT_SIMILARITY: f32 = 0.8;

/// A chunk paired with its embedding, ready for storage
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub record: ChunkRecord,
    pub embedding: Vec<f32>,
}

/// A retrieval hit with normalized similarity in [0, 1]
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub metadata: Value,
    pub similarity: f32,
    pub distance: f32,
}

impl ScoredChunk {
    pub fn artifact_id(&self) -> Option<&str> {
        self.metadata.get("artifact_id").and_then(|v| v.as_str())
    }

    pub fn artifact_type(&self) -> Option<&str> {
        self.metadata.get("artifact_type").and_then(|v| v.as_str())
    }
}

/// Metadata filters for similarity queries
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub owner_id: Option<String>,
    pub artifact_type: Option<String>,
    pub exclude_artifacts: Vec<String>,
    /// When set, only these artifacts are searched; takes precedence over
    /// `exclude_artifacts`
    pub include_only_artifacts: Option<Vec<String>>,
}

/// Best-effort collection statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub collection_name: String,
    pub chunk_count: u64,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct ClientState {
    initialized: bool,
    degraded: bool,
}

/// Client over a vector index backend with graceful degradation
pub struct VectorStoreClient {
    backend: Arc<dyn StoreBackend>,
    collection: String,
    dimension: usize,
    // Single lock guards both flags so concurrent initialize calls cannot race
    state: RwLock<ClientState>,
}

impl VectorStoreClient {
    /// Build a client for the configured backend kind
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let backend: Arc<dyn StoreBackend> = match config.backend {
            StoreBackendKind::Http => Arc::new(HttpBackend::new(&config.url, config.timeout_ms)?),
            StoreBackendKind::Memory => Arc::new(MemoryBackend::new()),
        };
        Ok(Self::with_backend(config, backend))
    }

    /// Build a client around an explicit backend (tests, custom indexes)
    pub fn with_backend(config: &StoreConfig, backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend,
            collection: config.collection.clone(),
            dimension: config.dimension,
            state: RwLock::new(ClientState::default()),
        }
    }

    /// Connect and create the target collection if absent; idempotent
    ///
    /// Connectivity failures set the degraded flag instead of raising; the
    /// next operation retries, so a recovered backend is picked up without a
    /// restart.
    pub async fn initialize(&self) {
        let mut state = self.state.write().await;
        if state.initialized {
            return;
        }

        match self.backend.ensure_collection(&self.collection).await {
            Ok(()) => {
                state.initialized = true;
                state.degraded = false;
                info!(collection = %self.collection, "vector store collection ready");
            }
            Err(err) => {
                state.degraded = true;
                warn!(error = %err, "vector store unreachable, operating in degraded mode");
            }
        }
    }

    /// Pure read of the availability flag
    pub async fn is_available(&self) -> bool {
        self.state.read().await.initialized
    }

    async fn ensure_ready(&self) -> bool {
        self.initialize().await;
        self.state.read().await.initialized
    }

    /// Store chunk embeddings, overwriting by deterministic id
    ///
    /// Ids are `owner_artifact_chunkIndex`, so re-processing the same
    /// artifact overwrites rather than duplicates. Chunks whose embedding
    /// does not match the configured dimension are rejected before storage.
    /// Degraded mode returns an empty id list.
    pub async fn add_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<Vec<String>, StoreError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        if !self.ensure_ready().await {
            warn!("vector store degraded, skipping chunk storage");
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(chunks.len());
        let mut entries = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if chunk.embedding.len() != self.dimension {
                warn!(
                    artifact_id = %chunk.record.artifact_id,
                    chunk_index = chunk.record.chunk_index,
                    expected = self.dimension,
                    actual = chunk.embedding.len(),
                    "rejecting chunk with mismatched embedding dimension"
                );
                continue;
            }

            let id = format!(
                "{}_{}_{}",
                chunk.record.owner_id, chunk.record.artifact_id, chunk.record.chunk_index
            );
            ids.push(id.clone());
            entries.push(StoredEntry {
                id,
                embedding: chunk.embedding.clone(),
                document: chunk.record.text.clone(),
                metadata: chunk_metadata(&chunk.record),
            });
        }

        if entries.is_empty() {
            return Ok(Vec::new());
        }

        self.backend.upsert(&self.collection, entries).await?;
        info!(count = ids.len(), collection = %self.collection, "stored chunks in vector index");
        Ok(ids)
    }

    /// Similarity query with metadata filters
    ///
    /// Over-fetches `2 × limit` candidates, converts backend distance to a
    /// normalized similarity (`max(0, 1 - distance/2)` for cosine distance in
    /// [0, 2], defaulting to 0.8 when the backend omits the distance), then
    /// filters by the floor, sorts descending and truncates.
    pub async fn query_similar(
        &self,
        embedding: &[f32],
        filters: &QueryFilters,
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if !self.ensure_ready().await {
            return Ok(Vec::new());
        }

        let where_clause = build_where(filters);
        let hits = match self
            .backend
            .query(
                &self.collection,
                embedding,
                limit.saturating_mul(2),
                where_clause.as_ref(),
            )
            .await
        {
            Ok(hits) => hits,
            Err(err) if err.is_connectivity() => {
                self.mark_degraded(&err).await;
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let mut chunks: Vec<ScoredChunk> = hits
            .into_iter()
            .filter_map(|hit| {
                let distance = hit.distance;
                let similarity = match distance {
                    Some(d) => (1.0 - d / 2.0).max(0.0),
                    None => DEFAULT_SIMILARITY,
                };
                if similarity < min_similarity {
                    return None;
                }
                Some(ScoredChunk {
                    id: hit.id,
                    text: hit.document,
                    metadata: hit.metadata,
                    similarity,
                    distance: distance.unwrap_or(0.0),
                })
            })
            .collect();

        chunks.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        chunks.truncate(limit);
        Ok(chunks)
    }

    /// Delete all chunks belonging to one artifact; returns the count
    /// deleted. Never errors on "nothing to delete" or an unreachable
    /// backend.
    pub async fn delete_by_artifact(&self, artifact_id: &str) -> u64 {
        self.delete_where(json!({ "artifact_id": artifact_id }), "artifact", artifact_id)
            .await
    }

    /// Delete all chunks belonging to one owner; returns the count deleted
    pub async fn delete_by_owner(&self, owner_id: &str) -> u64 {
        self.delete_where(json!({ "owner_id": owner_id }), "owner", owner_id)
            .await
    }

    async fn delete_where(&self, where_clause: Value, scope: &str, scope_id: &str) -> u64 {
        if !self.ensure_ready().await {
            return 0;
        }

        let ids = match self.backend.get_ids(&self.collection, &where_clause).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, scope, scope_id, "failed to look up chunks for deletion");
                if err.is_connectivity() {
                    self.mark_degraded(&err).await;
                }
                return 0;
            }
        };
        if ids.is_empty() {
            return 0;
        }

        match self.backend.delete(&self.collection, &ids).await {
            Ok(()) => {
                debug!(count = ids.len(), scope, scope_id, "deleted chunks from vector index");
                ids.len() as u64
            }
            Err(err) => {
                warn!(error = %err, scope, scope_id, "failed to delete chunks");
                0
            }
        }
    }

    /// Best-effort collection statistics; failures populate the error field
    /// instead of propagating
    pub async fn stats(&self) -> StoreStats {
        if !self.ensure_ready().await {
            return StoreStats {
                collection_name: self.collection.clone(),
                chunk_count: 0,
                error: Some("vector store unavailable".to_string()),
            };
        }

        match self.backend.count(&self.collection).await {
            Ok(chunk_count) => StoreStats {
                collection_name: self.collection.clone(),
                chunk_count,
                error: None,
            },
            Err(err) => StoreStats {
                collection_name: self.collection.clone(),
                chunk_count: 0,
                error: Some(err.to_string()),
            },
        }
    }

    async fn mark_degraded(&self, err: &StoreError) {
        let mut state = self.state.write().await;
        state.initialized = false;
        state.degraded = true;
        warn!(error = %err, "vector store connection lost, entering degraded mode");
    }
}

/// Attach identity fields on top of the caller's metadata; identity wins on
/// key collisions
fn chunk_metadata(record: &ChunkRecord) -> Value {
    let mut map = match &record.metadata {
        Value::Object(obj) => obj.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("extra".to_string(), other.clone());
            map
        }
    };
    map.insert("owner_id".to_string(), json!(record.owner_id));
    map.insert("artifact_id".to_string(), json!(record.artifact_id));
    map.insert("artifact_type".to_string(), json!(record.artifact_type));
    map.insert("chunk_index".to_string(), json!(record.chunk_index));
    map.insert(
        "created_at".to_string(),
        json!(record.created_at.to_rfc3339()),
    );
    Value::Object(map)
}

/// Translate filters into the backend's flat where-clause language
fn build_where(filters: &QueryFilters) -> Option<Value> {
    let mut clauses = Map::new();
    if let Some(owner_id) = &filters.owner_id {
        clauses.insert("owner_id".to_string(), json!(owner_id));
    }
    if let Some(artifact_type) = &filters.artifact_type {
        clauses.insert("artifact_type".to_string(), json!(artifact_type));
    }
    if !filters.exclude_artifacts.is_empty() {
        clauses.insert(
            "artifact_id".to_string(),
            json!({ "$nin": filters.exclude_artifacts }),
        );
    }
    // Allow-list wins over the exclusion list
    if let Some(include) = &filters.include_only_artifacts {
        if !include.is_empty() {
            clauses.insert("artifact_id".to_string(), json!({ "$in": include }));
        }
    }

    if clauses.is_empty() {
        None
    } else {
        Some(Value::Object(clauses))
    }
}
