//! The contextual vector store: embedding rows plus aligned chunk
//! metadata held in memory, persisted as a single artifact on disk.
//!
//! Loading is all-or-nothing. `load_data` stages enriched records,
//! embeds them, writes the artifact, and only then commits the new
//! state, so a failed load leaves both memory and disk as they were.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use thiserror::Error;

use crate::embedding::EmbeddingProvider;
use crate::models::{Chunk, ChunkMetadata};
use crate::persist;
use crate::progress::{LoadProgressEvent, LoadProgressReporter};
use crate::situate::ChunkPipeline;

/// Library default for `search` when the caller has no preference.
pub const DEFAULT_TOP_K: usize = 20;

/// Separator between formatted context blocks in search output.
const BLOCK_SEPARATOR: &str = "\n\n##################\n\n";

/// Store conditions callers are expected to match on.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No data loaded in store '{0}'. Run load first.")]
    EmptyStore(String),
    #[error("No store artifact at {}. Run load to create one.", .0.display())]
    ArtifactNotFound(PathBuf),
}

/// What a `load_data` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The dataset was enriched, embedded, and committed.
    Loaded { records: usize, annotated: usize },
    /// The store already held data; the dataset was not touched.
    AlreadyLoaded { records: usize },
}

pub struct ContextualStore {
    name: String,
    artifact_path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    embeddings: Vec<Vec<f32>>,
    metadata: Vec<ChunkMetadata>,
    query_cache: HashMap<String, Vec<f32>>,
}

impl ContextualStore {
    /// Create an empty store handle. Does not touch the filesystem.
    pub fn new(
        name: impl Into<String>,
        artifact_path: PathBuf,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            artifact_path,
            embedder,
            batch_size: batch_size.max(1),
            embeddings: Vec::new(),
            metadata: Vec::new(),
            query_cache: HashMap::new(),
        }
    }

    /// Create a store handle and pick up the persisted artifact if one
    /// exists at the configured path.
    pub fn open(
        name: impl Into<String>,
        artifact_path: PathBuf,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Result<Self> {
        let mut store = Self::new(name, artifact_path, embedder, batch_size);
        if store.artifact_path.exists() {
            store.load()?;
        }
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Embedding dimensionality, if any records are stored.
    pub fn dim(&self) -> Option<usize> {
        self.embeddings.first().map(Vec::len)
    }

    pub fn query_cache_len(&self) -> usize {
        self.query_cache.len()
    }

    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }

    /// Enrich, embed, and commit a dataset.
    ///
    /// Skips the whole run if the store already holds data; a populated
    /// store is treated as the durable result of a previous load, not
    /// something to append to. On success the artifact on disk and the
    /// in-memory state are replaced together.
    pub async fn load_data(
        &mut self,
        dataset: &[Chunk],
        pipeline: &ChunkPipeline,
        progress: &dyn LoadProgressReporter,
    ) -> Result<LoadOutcome> {
        if !self.embeddings.is_empty() && !self.metadata.is_empty() {
            return Ok(LoadOutcome::AlreadyLoaded {
                records: self.embeddings.len(),
            });
        }

        let records = pipeline.process_all(dataset, progress).await?;
        let texts: Vec<String> = records.iter().map(|r| r.text_to_embed.clone()).collect();
        let embeddings = self.embed_batches(&texts, progress).await?;
        let metadata: Vec<ChunkMetadata> = records.into_iter().map(|r| r.metadata).collect();
        let annotated = metadata
            .iter()
            .filter(|m| !m.contextualized_content.is_empty())
            .count();

        // Persist first so a write failure leaves memory untouched.
        persist::write_artifact(&self.artifact_path, &embeddings, &metadata, &self.query_cache)?;

        let total = metadata.len();
        self.embeddings = embeddings;
        self.metadata = metadata;
        Ok(LoadOutcome::Loaded {
            records: total,
            annotated,
        })
    }

    async fn embed_batches(
        &self,
        texts: &[String],
        progress: &dyn LoadProgressReporter,
    ) -> Result<Vec<Vec<f32>>> {
        let total = texts.len() as u64;
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let mut batch_vectors = self.embedder.embed(batch).await?;
            vectors.append(&mut batch_vectors);
            progress.report(LoadProgressEvent::Embedding {
                n: vectors.len() as u64,
                total,
            });
        }
        Ok(vectors)
    }

    /// Rank all stored records against `query` and return the top `k`
    /// as formatted context blocks.
    ///
    /// The query embedding is cached by exact query string, so repeat
    /// searches cost no provider call. Ranking is by descending dot
    /// product with ties kept in insertion order. Asking for more
    /// results than the store holds returns everything.
    pub async fn search(&mut self, query: &str, k: usize) -> Result<String> {
        if self.embeddings.is_empty() {
            return Err(StoreError::EmptyStore(self.name.clone()).into());
        }

        let query_embedding = match self.query_cache.get(query).cloned() {
            Some(vector) => vector,
            None => {
                let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
                let vector = vectors
                    .pop()
                    .ok_or_else(|| anyhow!("Embedding provider returned no vector for the query"))?;
                self.query_cache.insert(query.to_string(), vector.clone());
                vector
            }
        };

        if let Some(dim) = self.dim() {
            if query_embedding.len() != dim {
                bail!(
                    "Query embedding has dimension {} but the store holds dimension {}",
                    query_embedding.len(),
                    dim
                );
            }
        }

        struct Scored {
            index: usize,
            score: f64,
        }

        let mut scored: Vec<Scored> = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(index, stored)| Scored {
                index,
                score: dot(stored, &query_embedding),
            })
            .collect();

        // Stable sort keeps tied scores in insertion order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        let blocks: Vec<String> = scored
            .iter()
            .enumerate()
            .map(|(rank, s)| {
                let meta = &self.metadata[s.index];
                format!(
                    "<context {n}>\n**chapter** - {}\n**chunk_text** - {}\n**contextualized_chunk_text** - {}\n</context {n}>",
                    meta.chapter_title,
                    meta.original_content,
                    meta.contextualized_content,
                    n = rank + 1
                )
            })
            .collect();
        Ok(blocks.join(BLOCK_SEPARATOR))
    }

    /// Write the current state to the artifact path.
    pub fn save(&self) -> Result<()> {
        persist::write_artifact(
            &self.artifact_path,
            &self.embeddings,
            &self.metadata,
            &self.query_cache,
        )
    }

    /// Replace in-memory state with the persisted artifact.
    pub fn load(&mut self) -> Result<()> {
        if !self.artifact_path.exists() {
            return Err(StoreError::ArtifactNotFound(self.artifact_path.clone()).into());
        }
        let artifact = persist::read_artifact(&self.artifact_path)?;
        self.embeddings = artifact.embeddings;
        self.metadata = artifact.metadata;
        self.query_cache = artifact.query_cache;
        Ok(())
    }
}

/// Dot product with f64 accumulation to keep long sums stable.
fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}
