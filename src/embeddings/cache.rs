// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bounded FIFO cache for embedding vectors
//!
//! Keyed by a hash of (provider, model, normalized text) so a provider or
//! model switch naturally misses instead of serving stale-dimension vectors.
//! Eviction is strict FIFO on insertion order, not LRU: a hit does not
//! refresh an entry's position.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cache occupancy and hit-rate counters
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub len: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, Vec<f32>>,
    /// Insertion order for FIFO eviction
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

/// Concurrent-safe bounded embedding cache
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    inner: Arc<RwLock<CacheInner>>,
    max_size: usize,
}

impl EmbeddingCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner::default())),
            max_size,
        }
    }

    /// Look up a vector; counts a hit or a miss
    pub async fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut inner = self.inner.write().await;
        match inner.map.get(key).cloned() {
            Some(vector) => {
                inner.hits += 1;
                Some(vector)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert a vector, evicting the oldest-inserted entry when full
    pub async fn put(&self, key: String, vector: Vec<f32>) {
        if self.max_size == 0 {
            return;
        }
        let mut inner = self.inner.write().await;
        if inner.map.contains_key(&key) {
            // Replace in place; insertion order is unchanged
            inner.map.insert(key, vector);
            return;
        }
        while inner.map.len() >= self.max_size {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.map.remove(&oldest);
                }
                None => break,
            }
        }
        inner.order.push_back(key.clone());
        inner.map.insert(key, vector);
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.map.clear();
        inner.order.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        CacheStats {
            len: inner.map.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}
