// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Retrieval ranking over the vector store
//!
//! Turns a natural-language query into a ranked, diversity-limited list of
//! chunks. The store is queried with a relaxed floor and a doubled limit so
//! ranking has candidates to work with; the final pass groups by artifact
//! (at most two chunks each), re-applies the caller's true floor and
//! truncates to the requested limit.

use std::collections::HashMap;
use tracing::debug;

use crate::embeddings::EmbeddingClient;
use crate::errors::RagError;
use crate::store::{QueryFilters, ScoredChunk, VectorStoreClient};

/// Per-artifact cap keeps one long document from monopolizing the results
const MAX_CHUNKS_PER_ARTIFACT: usize = 2;

/// Fraction of the similarity floor used for the candidate fetch
const CANDIDATE_FLOOR_FACTOR: f32 = 0.9;

/// Options for one retrieval call
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    pub limit: usize,
    pub min_similarity: f32,
    pub artifact_type: Option<String>,
    pub exclude_artifacts: Vec<String>,
    /// When set, restricts the search to these artifacts
    pub include_only_artifacts: Option<Vec<String>>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            min_similarity: 0.7,
            artifact_type: None,
            exclude_artifacts: Vec::new(),
            include_only_artifacts: None,
        }
    }
}

/// Query-to-ranked-chunks pipeline
pub struct Retriever<'a> {
    embeddings: &'a EmbeddingClient,
    store: &'a VectorStoreClient,
}

impl<'a> Retriever<'a> {
    pub fn new(embeddings: &'a EmbeddingClient, store: &'a VectorStoreClient) -> Self {
        Self { embeddings, store }
    }

    /// Retrieve the most relevant chunks for a query, scoped to one owner
    ///
    /// A failed query embedding is a hard error; a degraded store yields an
    /// empty result instead.
    pub async fn retrieve(
        &self,
        owner_id: &str,
        query: &str,
        options: &RetrieveOptions,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let embedding = self
            .embeddings
            .embed(query)
            .await
            .map_err(RagError::QueryEmbedding)?;

        let filters = QueryFilters {
            owner_id: Some(owner_id.to_string()),
            artifact_type: options.artifact_type.clone(),
            exclude_artifacts: options.exclude_artifacts.clone(),
            include_only_artifacts: options.include_only_artifacts.clone(),
        };

        let candidates = self
            .store
            .query_similar(
                &embedding,
                &filters,
                options.limit.saturating_mul(2),
                options.min_similarity * CANDIDATE_FLOOR_FACTOR,
            )
            .await
            .map_err(RagError::Store)?;

        debug!(
            candidates = candidates.len(),
            limit = options.limit,
            "ranking retrieval candidates"
        );
        Ok(rank(candidates, options))
    }
}

/// Diversity grouping, floor filtering and final ordering
///
/// Candidates arrive sorted by similarity descending, so taking the first
/// `MAX_CHUNKS_PER_ARTIFACT` per artifact keeps each artifact's best chunks.
fn rank(candidates: Vec<ScoredChunk>, options: &RetrieveOptions) -> Vec<ScoredChunk> {
    let mut per_artifact: HashMap<String, usize> = HashMap::new();
    let mut ranked: Vec<ScoredChunk> = Vec::with_capacity(candidates.len());

    for chunk in candidates {
        if let Some(include) = &options.include_only_artifacts {
            if !chunk
                .artifact_id()
                .map(|id| include.iter().any(|a| a == id))
                .unwrap_or(false)
            {
                continue;
            }
        }
        if chunk.similarity < options.min_similarity {
            continue;
        }

        let key = chunk.artifact_id().unwrap_or(&chunk.id).to_string();
        let seen = per_artifact.entry(key).or_insert(0);
        if *seen >= MAX_CHUNKS_PER_ARTIFACT {
            continue;
        }
        *seen += 1;
        ranked.push(chunk);
    }

    ranked.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(options.limit);
    ranked
}
