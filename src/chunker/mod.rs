// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Artifact chunking
//!
//! Splits artifact text into overlapping, sentence-boundary-aware segments
//! for embedding and retrieval. Prose is windowed; structured bodies (quiz
//! questions, flashcards, slides) become one chunk per unit so retrieval
//! returns a self-contained unit of meaning instead of a mid-sentence
//! fragment.
//!
//! Chunking is a best-effort transform: empty or unusable input produces an
//! empty chunk list, never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ChunkerConfig;

/// Characters scanned on each side of a proposed cut when looking for a
/// sentence terminator
const BOUNDARY_SEARCH_RANGE: usize = 100;

/// A bounded span of artifact text, the atomic unit stored and retrieved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub owner_id: String,
    pub artifact_id: String,
    pub artifact_type: String,
    pub chunk_index: usize,
    pub text: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Identity attached to every chunk produced from one artifact
#[derive(Debug, Clone)]
pub struct ChunkContext {
    pub owner_id: String,
    pub artifact_id: String,
    pub artifact_type: String,
    /// Caller-supplied metadata copied onto each chunk
    pub metadata: Value,
}

impl ChunkContext {
    pub fn new(owner_id: &str, artifact_id: &str, artifact_type: &str, metadata: Value) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            artifact_id: artifact_id.to_string(),
            artifact_type: artifact_type.to_string(),
            metadata,
        }
    }

    fn record(&self, chunk_index: usize, text: String) -> ChunkRecord {
        ChunkRecord {
            owner_id: self.owner_id.clone(),
            artifact_id: self.artifact_id.clone(),
            artifact_type: self.artifact_type.clone(),
            chunk_index,
            text,
            metadata: self.metadata.clone(),
            created_at: Utc::now(),
        }
    }
}

/// One quiz question with optional options and answer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaItem {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub answer: Option<String>,
}

/// One flashcard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Flashcard {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

/// One slide; `points` wins over `content` when both are present
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Slide {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub points: Option<Vec<String>>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Artifact body shapes, dispatched through a single chunking entry point
///
/// Unknown artifact types fall back to `Generic` (stringify and prose-chunk).
#[derive(Debug, Clone)]
pub enum ArtifactBody {
    Prose(String),
    Qa(Vec<QaItem>),
    Flashcards(Vec<Flashcard>),
    Slides(Vec<Slide>),
    Generic(Value),
}

impl ArtifactBody {
    /// Map a raw JSON body to its chunking shape based on the artifact type
    /// tag. Bodies that fail to parse for their declared type fall back to
    /// `Generic`.
    pub fn from_json(artifact_type: &str, body: Value) -> Self {
        match artifact_type {
            "blog" | "summary" => {
                // Prose types only chunk string bodies; anything else
                // produces no chunks
                ArtifactBody::Prose(body.as_str().unwrap_or_default().to_string())
            }
            "quiz" => match serde_json::from_value::<Vec<QaItem>>(body.clone()) {
                Ok(items) => ArtifactBody::Qa(items),
                Err(_) => ArtifactBody::Generic(body),
            },
            "flashcards" => match serde_json::from_value::<Vec<Flashcard>>(body.clone()) {
                Ok(cards) => ArtifactBody::Flashcards(cards),
                Err(_) => ArtifactBody::Generic(body),
            },
            "slides" => match serde_json::from_value::<Vec<Slide>>(body.clone()) {
                Ok(slides) => ArtifactBody::Slides(slides),
                Err(_) => ArtifactBody::Generic(body),
            },
            _ => ArtifactBody::Generic(body),
        }
    }
}

/// Sliding-window text chunker with per-type dispatch for structured bodies
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Chunk an artifact body according to its shape
    ///
    /// Structured units (one question, one card, one slide) become exactly
    /// one chunk each, serialized to a stable textual form. Prose and
    /// generic bodies go through the sliding window.
    pub fn chunk_artifact(&self, body: &ArtifactBody, ctx: &ChunkContext) -> Vec<ChunkRecord> {
        match body {
            ArtifactBody::Prose(text) => self.chunk_text(text, ctx),
            ArtifactBody::Qa(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| ctx.record(i, serialize_qa(item)))
                .collect(),
            ArtifactBody::Flashcards(cards) => cards
                .iter()
                .enumerate()
                .map(|(i, card)| {
                    ctx.record(i, format!("Question: {}\nAnswer: {}", card.question, card.answer))
                })
                .collect(),
            ArtifactBody::Slides(slides) => slides
                .iter()
                .enumerate()
                .map(|(i, slide)| ctx.record(i, serialize_slide(slide)))
                .collect(),
            ArtifactBody::Generic(value) => {
                let text = match value.as_str() {
                    Some(s) => s.to_string(),
                    None => value.to_string(),
                };
                self.chunk_text(&text, ctx)
            }
        }
    }

    /// Split prose into overlapping windows cut at sentence boundaries
    ///
    /// Texts at or under `chunk_size` return a single trimmed chunk. Longer
    /// texts slide a `chunk_size` window with `chunk_overlap` backward
    /// overlap; each proposed cut is moved to the nearest sentence terminator
    /// at or before it when that still leaves `min_chunk_size` characters.
    /// Stops hard at `max_chunks`; remaining text is discarded.
    pub fn chunk_text(&self, text: &str, ctx: &ChunkContext) -> Vec<ChunkRecord> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // All window arithmetic is in chars so cuts never split a multi-byte
        // character
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();

        if len <= self.config.chunk_size {
            return vec![ctx.record(0, text.trim().to_string())];
        }

        let mut records = Vec::new();
        let mut start = 0usize;
        let mut chunk_index = 0usize;

        while start < len && records.len() < self.config.max_chunks {
            let mut end = (start + self.config.chunk_size).min(len);

            if end < len {
                let boundary = self.find_sentence_boundary(&chars, end);
                if boundary > start + self.config.min_chunk_size {
                    end = boundary;
                }
            }

            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if chunk.chars().count() >= self.config.min_chunk_size {
                records.push(ctx.record(chunk_index, chunk.to_string()));
                chunk_index += 1;
            }

            if end >= len {
                break;
            }

            // Overlap can exceed the advance when a boundary cut lands close
            // to the window start; force forward progress
            let next = end.saturating_sub(self.config.chunk_overlap);
            start = if next > start { next } else { end };
        }

        records
    }

    /// Find the end of the last sentence at or before `index`, scanning a
    /// bounded window around it. Returns `index` unchanged when no terminator
    /// is found.
    fn find_sentence_boundary(&self, chars: &[char], index: usize) -> usize {
        let search_start = index.saturating_sub(BOUNDARY_SEARCH_RANGE);
        let search_end = (index + BOUNDARY_SEARCH_RANGE).min(chars.len());

        let mut last_match = index;
        let mut i = search_start;
        while i + 1 < search_end {
            if matches!(chars[i], '.' | '!' | '?') && chars[i + 1].is_whitespace() {
                // The boundary sits after the terminator and its whitespace run
                let mut j = i + 1;
                while j < search_end && chars[j].is_whitespace() {
                    j += 1;
                }
                if j <= index {
                    last_match = j;
                    i = j;
                    continue;
                }
                break;
            }
            i += 1;
        }

        last_match
    }
}

fn serialize_qa(item: &QaItem) -> String {
    let options = match &item.options {
        Some(options) if !options.is_empty() => options.join(", "),
        _ => "N/A".to_string(),
    };
    let answer = item.answer.as_deref().unwrap_or("N/A");
    format!(
        "Question: {}\nOptions: {}\nAnswer: {}",
        item.question, options, answer
    )
}

fn serialize_slide(slide: &Slide) -> String {
    let content = match &slide.points {
        Some(points) => points.join("\n"),
        None => slide.content.clone().unwrap_or_default(),
    };
    format!("Title: {}\nContent: {}", slide.title, content)
}
