//! Core data models used throughout Context Vault.
//!
//! These types represent the chunks, enrichment output, and per-record
//! metadata that flow through the load and search pipeline.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Input unit: a fragment of source text supplied by the dataset file.
#[derive(Debug, Clone, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub chapter_title: String,
    pub text: String,
}

/// Per-record metadata stored alongside each embedding vector.
///
/// `contextualized_content` is the situating annotation produced during
/// enrichment, or the empty string when no source document matched (or the
/// enrichment call failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub chapter_title: String,
    pub original_content: String,
    pub contextualized_content: String,
}

/// Output of processing one chunk: the text that goes to the embedding
/// provider plus the metadata committed to the store at the same index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRecord {
    pub text_to_embed: String,
    pub metadata: ChunkMetadata,
}

/// Read a dataset file: a JSON array of chunk objects.
pub fn read_dataset(path: &Path) -> Result<Vec<Chunk>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset file: {}", path.display()))?;
    let chunks: Vec<Chunk> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse dataset file: {}", path.display()))?;
    Ok(chunks)
}
