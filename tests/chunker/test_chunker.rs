// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use rag_core::{ArtifactBody, ChunkContext, Chunker, ChunkerConfig};
use serde_json::json;

fn ctx() -> ChunkContext {
    ChunkContext::new("user-1", "artifact-1", "blog", json!({ "topic": "testing" }))
}

fn default_chunker() -> Chunker {
    Chunker::new(ChunkerConfig::default())
}

#[test]
fn test_short_text_single_trimmed_chunk() {
    let chunker = default_chunker();
    let records = chunker.chunk_text("  A short paragraph about nothing much.  ", &ctx());

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "A short paragraph about nothing much.");
    assert_eq!(records[0].chunk_index, 0);
    assert_eq!(records[0].owner_id, "user-1");
    assert_eq!(records[0].artifact_id, "artifact-1");
}

#[test]
fn test_empty_text_produces_no_chunks() {
    let chunker = default_chunker();
    assert!(chunker.chunk_text("", &ctx()).is_empty());
    assert!(chunker.chunk_text("   \n\t  ", &ctx()).is_empty());
}

#[test]
fn test_long_text_chunk_properties() {
    // 16 sentences of ~100 chars each, well past one window
    let sentence = format!("{}. ", "word".repeat(24));
    let text: String = sentence.repeat(16);
    assert!(text.len() > 1500);

    let config = ChunkerConfig::default();
    let chunker = Chunker::new(config.clone());
    let records = chunker.chunk_text(&text, &ctx());

    assert!(records.len() >= 2);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.chunk_index, i);
        assert!(record.text.chars().count() >= config.min_chunk_size);
    }

    // The final window reaches the end of the text
    let tail: String = text.trim_end().chars().rev().take(30).collect();
    let tail: String = tail.chars().rev().collect();
    assert!(records.last().unwrap().text.ends_with(&tail));
}

#[test]
fn test_consecutive_chunks_overlap() {
    let sentence = format!("{}. ", "word".repeat(24));
    let text: String = sentence.repeat(16);
    let chunker = default_chunker();
    let records = chunker.chunk_text(&text, &ctx());
    assert!(records.len() >= 2);

    // The second chunk starts inside text the first chunk already covered
    let first = &records[0].text;
    let second = &records[1].text;
    let overlap_probe: String = second.chars().take(40).collect();
    assert!(first.contains(overlap_probe.trim_start()));
}

#[test]
fn test_max_chunks_cutoff() {
    let config = ChunkerConfig {
        chunk_size: 100,
        chunk_overlap: 10,
        min_chunk_size: 10,
        max_chunks: 3,
    };
    let chunker = Chunker::new(config);
    let text = "alpha beta gamma delta. ".repeat(100);
    let records = chunker.chunk_text(&text, &ctx());

    assert_eq!(records.len(), 3);
}

#[test]
fn test_chunker_terminates_on_pathological_window() {
    // Tail shorter than the overlap must not loop or repeat chunks
    let config = ChunkerConfig {
        chunk_size: 100,
        chunk_overlap: 90,
        min_chunk_size: 10,
        max_chunks: 1000,
    };
    let chunker = Chunker::new(config);
    let text = "abcdefghijklmnopqrstuvwxyz".repeat(12);
    let records = chunker.chunk_text(&text, &ctx());

    assert!(records.len() < 1000);
    for pair in records.windows(2) {
        assert_ne!(pair[0].text, pair[1].text);
    }
}

#[test]
fn test_quiz_body_one_chunk_per_question() {
    let body = ArtifactBody::from_json(
        "quiz",
        json!([{ "question": "Q1?", "options": ["A", "B"], "answer": "A" }]),
    );
    let quiz_ctx = ChunkContext::new("user-1", "a1", "quiz", json!({}));
    let records = default_chunker().chunk_artifact(&body, &quiz_ctx);

    assert_eq!(records.len(), 1);
    assert!(records[0].text.contains("Question: Q1?"));
    assert!(records[0].text.contains("Options: A, B"));
    assert!(records[0].text.contains("Answer: A"));
}

#[test]
fn test_quiz_missing_fields_serialized_as_na() {
    let body = ArtifactBody::from_json("quiz", json!([{ "question": "Q1?" }]));
    let records = default_chunker().chunk_artifact(&body, &ctx());

    assert_eq!(records.len(), 1);
    assert!(records[0].text.contains("Options: N/A"));
    assert!(records[0].text.contains("Answer: N/A"));
}

#[test]
fn test_flashcards_one_chunk_per_card() {
    let body = ArtifactBody::from_json(
        "flashcards",
        json!([
            { "question": "What is Rust?", "answer": "A language" },
            { "question": "What is cargo?", "answer": "Its build tool" }
        ]),
    );
    let records = default_chunker().chunk_artifact(&body, &ctx());

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].text, "Question: What is Rust?\nAnswer: A language");
    assert_eq!(records[1].chunk_index, 1);
}

#[test]
fn test_slide_points_win_over_content() {
    let body = ArtifactBody::from_json(
        "slides",
        json!([{
            "title": "Intro",
            "content": "ignored",
            "points": ["first", "second"]
        }]),
    );
    let records = default_chunker().chunk_artifact(&body, &ctx());

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "Title: Intro\nContent: first\nsecond");
}

#[test]
fn test_unknown_type_falls_back_to_generic() {
    let body = ArtifactBody::from_json("mindmap", json!({ "root": "topic" }));
    let records = default_chunker().chunk_artifact(&body, &ctx());

    assert_eq!(records.len(), 1);
    assert!(records[0].text.contains("topic"));
}

#[test]
fn test_metadata_carried_onto_every_chunk() {
    let records = default_chunker().chunk_text("Some prose content.", &ctx());
    assert_eq!(records[0].metadata, json!({ "topic": "testing" }));
    assert_eq!(records[0].artifact_type, "blog");
}
