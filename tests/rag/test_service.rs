// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use rag_core::store::backend::{BackendHit, StoreBackend, StoredEntry};
use rag_core::{
    EmbeddingClient, EmbeddingConfig, OriginalSource, RagConfig, RagService, RetrieveOptions,
    StoreBackendKind, StoreConfig, StoreError, VectorStoreClient,
};

fn test_config() -> RagConfig {
    let embedding = EmbeddingConfig {
        batch_delay_ms: 0,
        ..EmbeddingConfig::mock()
    };
    let store = StoreConfig {
        backend: StoreBackendKind::Memory,
        dimension: embedding.dimension,
        ..StoreConfig::default()
    };
    RagConfig {
        embedding,
        store,
        embed_batch_delay_ms: 0,
        ..RagConfig::default()
    }
}

fn test_service() -> RagService {
    RagService::new(test_config()).unwrap()
}

/// Backend that refuses every call, as if the index process were down
struct UnreachableBackend;

#[async_trait]
impl StoreBackend for UnreachableBackend {
    async fn ensure_collection(&self, _name: &str) -> Result<(), StoreError> {
        Err(StoreError::CollectionUnavailable(
            "connection refused".to_string(),
        ))
    }

    async fn upsert(&self, _name: &str, _entries: Vec<StoredEntry>) -> Result<(), StoreError> {
        Err(StoreError::CollectionUnavailable(
            "connection refused".to_string(),
        ))
    }

    async fn query(
        &self,
        _name: &str,
        _embedding: &[f32],
        _n_results: usize,
        _where_clause: Option<&Value>,
    ) -> Result<Vec<BackendHit>, StoreError> {
        Err(StoreError::CollectionUnavailable(
            "connection refused".to_string(),
        ))
    }

    async fn get_ids(&self, _name: &str, _where_clause: &Value) -> Result<Vec<String>, StoreError> {
        Err(StoreError::CollectionUnavailable(
            "connection refused".to_string(),
        ))
    }

    async fn delete(&self, _name: &str, _ids: &[String]) -> Result<(), StoreError> {
        Err(StoreError::CollectionUnavailable(
            "connection refused".to_string(),
        ))
    }

    async fn count(&self, _name: &str) -> Result<u64, StoreError> {
        Err(StoreError::CollectionUnavailable(
            "connection refused".to_string(),
        ))
    }
}

fn degraded_service() -> RagService {
    let config = test_config();
    let embeddings = EmbeddingClient::new(config.embedding.clone()).unwrap();
    let store = VectorStoreClient::with_backend(&config.store, Arc::new(UnreachableBackend));
    RagService::with_components(config, embeddings, store)
}

#[tokio::test]
async fn test_process_artifact_prose_end_to_end() {
    let service = test_service();
    let outcome = service
        .process_artifact(
            "u1",
            "a1",
            "blog",
            json!("Rust's ownership system prevents data races at compile time."),
            json!({}),
        )
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.chunks_created, 1);
    assert!(outcome.error.is_none());
    assert!(service.is_available().await);
    assert_eq!(service.store_stats().await.chunk_count, 1);
}

#[tokio::test]
async fn test_retrieve_finds_processed_content() {
    let service = test_service();
    let text = "Rust's ownership system prevents data races at compile time.";
    service
        .process_artifact("u1", "a1", "blog", json!(text), json!({}))
        .await;

    // The mock embedder is deterministic, so the identical query scores 1.0
    let hits = service
        .retrieve("u1", text, &RetrieveOptions::default())
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].artifact_id(), Some("a1"));
    assert!(hits[0].similarity > 0.99);
    assert_eq!(hits[0].text, text);
}

#[tokio::test]
async fn test_retrieve_scoped_to_owner() {
    let service = test_service();
    let text = "Shared knowledge about borrow checking.";
    service
        .process_artifact("u1", "a1", "blog", json!(text), json!({}))
        .await;

    let hits = service
        .retrieve("someone-else", text, &RetrieveOptions::default())
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_reprocessing_replaces_previous_chunks() {
    let service = test_service();
    let old_text = "The first version of this article talks about lifetimes.";
    let new_text = "The rewritten article is entirely about async executors.";

    service
        .process_artifact("u1", "a1", "blog", json!(old_text), json!({}))
        .await;
    let outcome = service
        .process_artifact("u1", "a1", "blog", json!(new_text), json!({}))
        .await;
    assert!(outcome.success);

    let stale = service
        .retrieve("u1", old_text, &RetrieveOptions::default())
        .await
        .unwrap();
    assert!(stale.iter().all(|c| c.text != old_text));

    let fresh = service
        .retrieve("u1", new_text, &RetrieveOptions::default())
        .await
        .unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].text, new_text);
    assert_eq!(service.store_stats().await.chunk_count, 1);
}

#[tokio::test]
async fn test_quiz_artifact_scenario() {
    let service = test_service();
    let outcome = service
        .process_artifact(
            "u1",
            "a1",
            "quiz",
            json!([{ "question": "Q1?", "options": ["A", "B"], "answer": "A" }]),
            json!({}),
        )
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.chunks_created, 1);

    let hits = service
        .retrieve(
            "u1",
            "Question: Q1?",
            &RetrieveOptions {
                min_similarity: 0.0,
                ..RetrieveOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].text.contains("Question: Q1?"));
    assert!(hits[0].text.contains("Answer: A"));
}

#[tokio::test]
async fn test_empty_body_is_success_with_zero_chunks() {
    let service = test_service();
    let outcome = service
        .process_artifact("u1", "a1", "blog", json!("   "), json!({}))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.chunks_created, 0);
}

#[tokio::test]
async fn test_delete_artifact_removes_from_retrieval() {
    let service = test_service();
    let text = "Content that will be deleted shortly.";
    service
        .process_artifact("u1", "a1", "blog", json!(text), json!({}))
        .await;

    let deleted = service.delete_artifact("a1").await;
    assert_eq!(deleted.chunks_deleted, 1);

    let hits = service
        .retrieve("u1", text, &RetrieveOptions::default())
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_delete_owner_cascades_across_artifacts() {
    let service = test_service();
    service
        .process_artifact("u1", "a1", "blog", json!("First artifact body."), json!({}))
        .await;
    service
        .process_artifact("u1", "a2", "blog", json!("Second artifact body."), json!({}))
        .await;

    let deleted = service.delete_owner("u1").await;
    assert_eq!(deleted.chunks_deleted, 2);
    assert_eq!(service.store_stats().await.chunk_count, 0);
}

#[tokio::test]
async fn test_degraded_store_never_raises() {
    let service = degraded_service();

    let outcome = service
        .process_artifact(
            "u1",
            "a1",
            "blog",
            json!("Content that cannot be persisted right now."),
            json!({}),
        )
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.chunks_created, 0);

    let hits = service
        .retrieve("u1", "anything at all", &RetrieveOptions::default())
        .await
        .unwrap();
    assert!(hits.is_empty());

    assert_eq!(service.delete_artifact("a1").await.chunks_deleted, 0);
    assert_eq!(service.delete_owner("u1").await.chunks_deleted, 0);
    assert!(!service.is_available().await);

    let stats = service.store_stats().await;
    assert_eq!(stats.chunk_count, 0);
    assert!(stats.error.is_some());
}

#[tokio::test]
async fn test_cache_reused_across_pipeline_calls() {
    let service = test_service();
    let text = "Identical content processed twice.";

    service
        .process_artifact("u1", "a1", "blog", json!(text), json!({}))
        .await;
    service
        .process_artifact("u1", "a2", "blog", json!(text), json!({}))
        .await;

    let stats = service.cache_stats().await;
    assert_eq!(stats.len, 1);
    assert!(stats.hits >= 1);
}

#[tokio::test]
async fn test_assemble_context_through_service() {
    let service = test_service();
    let text = "Borrow checking explained for beginners.";
    service
        .process_artifact("u1", "a1", "summary", json!(text), json!({}))
        .await;

    let hits = service
        .retrieve("u1", text, &RetrieveOptions::default())
        .await
        .unwrap();

    let mut session = BTreeMap::new();
    session.insert("blog".to_string(), json!("draft in progress"));
    let source = OriginalSource {
        source_type: "article".to_string(),
        url: None,
        content: "source text".to_string(),
    };

    let context = service.assemble_context(&hits, &session, Some(&source));
    assert!(context.contains("ORIGINAL SOURCE MATERIAL:"));
    assert!(context.contains("CURRENT SESSION GENERATED CONTENT:"));
    assert!(context.contains("RELEVANT CONTENT FROM YOUR LEARNING HISTORY:"));
    assert!(context.contains("SUMMARY (Relevance: 100.0%):"));
    assert!(context.contains(text));
}
