// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vector index backends
//!
//! `HttpBackend` speaks a Chroma-style REST API; `MemoryBackend` keeps
//! everything in a map for tests and offline development. Both translate the
//! same flat where-clause language: a field mapped to a bare value means
//! equality, `{"$in": [..]}` / `{"$nin": [..]}` mean membership.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::embeddings::cosine_similarity;
use crate::errors::StoreError;

/// One `{id, vector, document, metadata}` tuple as stored in the index
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: Value,
}

/// Raw similarity hit before distance normalization
#[derive(Debug, Clone)]
pub struct BackendHit {
    pub id: String,
    pub document: String,
    pub metadata: Value,
    /// Cosine distance in [0, 2]; backends may omit it
    pub distance: Option<f32>,
}

/// Narrow interface over a vector index
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Create the collection if absent; idempotent
    async fn ensure_collection(&self, name: &str) -> Result<(), StoreError>;

    /// Insert or overwrite entries by id
    async fn upsert(&self, name: &str, entries: Vec<StoredEntry>) -> Result<(), StoreError>;

    /// Nearest-neighbor query with an optional metadata filter
    async fn query(
        &self,
        name: &str,
        embedding: &[f32],
        n_results: usize,
        where_clause: Option<&Value>,
    ) -> Result<Vec<BackendHit>, StoreError>;

    /// Ids of all entries matching a metadata filter
    async fn get_ids(&self, name: &str, where_clause: &Value) -> Result<Vec<String>, StoreError>;

    /// Delete entries by id list
    async fn delete(&self, name: &str, ids: &[String]) -> Result<(), StoreError>;

    /// Total entry count in the collection
    async fn count(&self, name: &str) -> Result<u64, StoreError>;
}

/// Evaluate the flat where-clause language against entry metadata
pub(crate) fn matches_where(metadata: &Value, where_clause: &Value) -> bool {
    let clauses = match where_clause.as_object() {
        Some(obj) => obj,
        None => return true,
    };

    for (field, condition) in clauses {
        let value = metadata.get(field).unwrap_or(&Value::Null);
        match condition.as_object() {
            Some(ops) => {
                for (op, expected) in ops {
                    let ok = match (op.as_str(), expected.as_array()) {
                        ("$eq", _) => value == expected,
                        ("$in", Some(list)) => list.contains(value),
                        ("$nin", Some(list)) => !list.contains(value),
                        // Unknown operator matches everything
                        _ => true,
                    };
                    if !ok {
                        return false;
                    }
                }
            }
            None => {
                if value != condition {
                    return false;
                }
            }
        }
    }

    true
}

/// In-memory backend with brute-force cosine search
#[derive(Default)]
pub struct MemoryBackend {
    collections: Arc<RwLock<HashMap<String, HashMap<String, StoredEntry>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn ensure_collection(&self, name: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn upsert(&self, name: &str, entries: Vec<StoredEntry>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections.entry(name.to_string()).or_default();
        for entry in entries {
            collection.insert(entry.id.clone(), entry);
        }
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        embedding: &[f32],
        n_results: usize,
        where_clause: Option<&Value>,
    ) -> Result<Vec<BackendHit>, StoreError> {
        let collections = self.collections.read().await;
        let collection = match collections.get(name) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        let mut hits: Vec<BackendHit> = collection
            .values()
            .filter(|entry| {
                where_clause
                    .map(|w| matches_where(&entry.metadata, w))
                    .unwrap_or(true)
            })
            .map(|entry| {
                // A stored vector with the wrong dimension scores as maximally
                // distant instead of poisoning the ranking pass
                let distance = if entry.embedding.len() != embedding.len() {
                    2.0
                } else {
                    1.0 - cosine_similarity(embedding, &entry.embedding)
                };
                BackendHit {
                    id: entry.id.clone(),
                    document: entry.document.clone(),
                    metadata: entry.metadata.clone(),
                    distance: Some(distance),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn get_ids(&self, name: &str, where_clause: &Value) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.read().await;
        let collection = match collections.get(name) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };
        Ok(collection
            .values()
            .filter(|entry| matches_where(&entry.metadata, where_clause))
            .map(|entry| entry.id.clone())
            .collect())
    }

    async fn delete(&self, name: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        if let Some(collection) = collections.get_mut(name) {
            for id in ids {
                collection.remove(id);
            }
        }
        Ok(())
    }

    async fn count(&self, name: &str) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| c.len() as u64).unwrap_or(0))
    }
}

/// Chroma-style REST backend
pub struct HttpBackend {
    http: Client,
    base_url: String,
    /// Collection id resolved by `ensure_collection`
    collection_id: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

#[derive(Deserialize)]
struct GetResponse {
    ids: Vec<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection_id: RwLock::new(None),
        })
    }

    async fn resolved_collection_id(&self) -> Result<String, StoreError> {
        self.collection_id
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::CollectionUnavailable("collection not initialized".to_string()))
    }

    async fn post(&self, path: &str, body: Value) -> Result<reqwest::Response, StoreError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!("{}: {}", status, message)));
        }
        Ok(response)
    }
}

#[async_trait]
impl StoreBackend for HttpBackend {
    async fn ensure_collection(&self, name: &str) -> Result<(), StoreError> {
        {
            let id = self.collection_id.read().await;
            if id.is_some() {
                return Ok(());
            }
        }

        let response = self
            .post(
                "/api/v1/collections",
                json!({ "name": name, "get_or_create": true }),
            )
            .await
            .map_err(|err| match err {
                StoreError::Http(e) => StoreError::CollectionUnavailable(e.to_string()),
                other => other,
            })?;
        let collection: CollectionResponse = response.json().await?;

        *self.collection_id.write().await = Some(collection.id);
        Ok(())
    }

    async fn upsert(&self, _name: &str, entries: Vec<StoredEntry>) -> Result<(), StoreError> {
        let id = self.resolved_collection_id().await?;

        let mut ids = Vec::with_capacity(entries.len());
        let mut embeddings = Vec::with_capacity(entries.len());
        let mut documents = Vec::with_capacity(entries.len());
        let mut metadatas = Vec::with_capacity(entries.len());
        for entry in entries {
            ids.push(entry.id);
            embeddings.push(entry.embedding);
            documents.push(entry.document);
            metadatas.push(entry.metadata);
        }

        self.post(
            &format!("/api/v1/collections/{}/upsert", id),
            json!({
                "ids": ids,
                "embeddings": embeddings,
                "documents": documents,
                "metadatas": metadatas,
            }),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        _name: &str,
        embedding: &[f32],
        n_results: usize,
        where_clause: Option<&Value>,
    ) -> Result<Vec<BackendHit>, StoreError> {
        let id = self.resolved_collection_id().await?;

        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(clause) = where_clause {
            body["where"] = clause.clone();
        }

        let response = self
            .post(&format!("/api/v1/collections/{}/query", id), body)
            .await?;
        let parsed: QueryResponse = response.json().await?;

        let ids = parsed.ids.into_iter().next().unwrap_or_default();
        let documents = parsed
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let metadatas = parsed
            .metadatas
            .and_then(|m| m.into_iter().next())
            .unwrap_or_default();
        let distances = parsed
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        let hits = ids
            .into_iter()
            .enumerate()
            .map(|(i, hit_id)| BackendHit {
                id: hit_id,
                document: documents
                    .get(i)
                    .and_then(|d| d.clone())
                    .unwrap_or_default(),
                metadata: metadatas
                    .get(i)
                    .and_then(|m| m.clone())
                    .unwrap_or_else(|| json!({})),
                distance: distances.get(i).copied(),
            })
            .collect();
        Ok(hits)
    }

    async fn get_ids(&self, _name: &str, where_clause: &Value) -> Result<Vec<String>, StoreError> {
        let id = self.resolved_collection_id().await?;
        let response = self
            .post(
                &format!("/api/v1/collections/{}/get", id),
                json!({ "where": where_clause, "include": [] }),
            )
            .await?;
        let parsed: GetResponse = response.json().await?;
        Ok(parsed.ids)
    }

    async fn delete(&self, _name: &str, ids: &[String]) -> Result<(), StoreError> {
        let id = self.resolved_collection_id().await?;
        self.post(
            &format!("/api/v1/collections/{}/delete", id),
            json!({ "ids": ids }),
        )
        .await?;
        Ok(())
    }

    async fn count(&self, _name: &str) -> Result<u64, StoreError> {
        let id = self.resolved_collection_id().await?;
        let response = self
            .http
            .get(format!("{}/api/v1/collections/{}/count", self.base_url, id))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(StoreError::Backend(format!("count failed: {}", status)));
        }
        Ok(response.json().await?)
    }
}
