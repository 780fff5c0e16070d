// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prompt context assembly
//!
//! Formats retrieved chunks plus caller-supplied session material into one
//! deterministic text block. Every section is truncated to a fixed character
//! budget so the assembled prompt stays bounded no matter how large the
//! inputs are.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::store::ScoredChunk;

/// Character budget for the original source section
const SOURCE_TRUNCATE_CHARS: usize = 1500;

/// Character budget for each session entry
const SESSION_TRUNCATE_CHARS: usize = 1000;

/// Source material the current session was generated from
#[derive(Debug, Clone)]
pub struct OriginalSource {
    pub source_type: String,
    pub url: Option<String>,
    pub content: String,
}

/// Assemble a prompt context block from retrieval results and session state
///
/// Sections appear in priority order: original source, then content generated
/// in the current session (keyed by artifact type, not yet embedded), then
/// retrieved history grouped by source artifact. Retrieved groups keep the
/// chunks' ranked order and are labeled with the group's best similarity as a
/// percentage. Output is fully deterministic for a given input.
pub fn assemble_context(
    chunks: &[ScoredChunk],
    current_session: &BTreeMap<String, Value>,
    original_source: Option<&OriginalSource>,
) -> String {
    let mut context = String::new();

    if let Some(source) = original_source {
        if !source.content.is_empty() {
            context.push_str("ORIGINAL SOURCE MATERIAL:\n");
            context.push_str(&format!("Type: {}\n", source.source_type));
            if let Some(url) = &source.url {
                context.push_str(&format!("Source: {url}\n"));
            }
            context.push_str(&format!(
                "Content: {}\n\n",
                truncate_text(&source.content, SOURCE_TRUNCATE_CHARS)
            ));
        }
    }

    if !current_session.is_empty() {
        context.push_str("CURRENT SESSION GENERATED CONTENT:\n");
        for (artifact_type, content) in current_session {
            if content.is_null() {
                continue;
            }
            context.push_str(&format!("{}:\n", artifact_type.to_uppercase()));
            match content {
                Value::String(text) => {
                    context.push_str(&format!(
                        "{}\n\n",
                        truncate_text(text, SESSION_TRUNCATE_CHARS)
                    ));
                }
                other => {
                    let rendered =
                        serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string());
                    let clipped: String = rendered.chars().take(SESSION_TRUNCATE_CHARS).collect();
                    context.push_str(&format!("{clipped}...\n\n"));
                }
            }
        }
    }

    if !chunks.is_empty() {
        context.push_str("RELEVANT CONTENT FROM YOUR LEARNING HISTORY:\n");

        // Group by source artifact, preserving the chunks' ranked order both
        // across groups and within each group
        let mut group_order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, Vec<&ScoredChunk>> = BTreeMap::new();
        for chunk in chunks {
            let key = chunk.artifact_id().unwrap_or(&chunk.id).to_string();
            if !groups.contains_key(&key) {
                group_order.push(key.clone());
            }
            groups.entry(key).or_default().push(chunk);
        }

        for key in &group_order {
            let group = &groups[key];
            let first = group[0];
            let label = first.artifact_type().unwrap_or("content").to_uppercase();
            context.push_str(&format!(
                "\n{} (Relevance: {:.1}%):\n",
                label,
                first.similarity * 100.0
            ));
            for (index, chunk) in group.iter().enumerate() {
                context.push_str(&format!("[Chunk {}] {}\n", index + 1, chunk.text));
            }
        }
    }

    context
}

/// Char-based truncation with a trailing ellipsis marker
fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max_chars).collect();
    format!("{clipped}...")
}
