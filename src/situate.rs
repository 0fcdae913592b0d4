//! Chunk enrichment pipeline: pair each dataset chunk with its source
//! document, ask the contextualizer to situate it, and produce the text
//! that goes to the embedding provider.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;

use crate::corpus;
use crate::enrich::Contextualizer;
use crate::gate::RateGate;
use crate::models::{Chunk, ChunkMetadata, EnrichedRecord};
use crate::progress::{LoadProgressEvent, LoadProgressReporter};
use crate::usage::TokenAccountant;

/// Runs chunks through document lookup and contextual enrichment.
///
/// Cloning is cheap; the contextualizer, rate gate, and token accountant
/// are shared across clones so concurrent workers pace against the same
/// schedule and report into the same totals.
#[derive(Clone)]
pub struct ChunkPipeline {
    corpus_dir: PathBuf,
    contextualizer: Arc<dyn Contextualizer>,
    accountant: Arc<TokenAccountant>,
    gate: Arc<RateGate>,
    workers: usize,
}

impl ChunkPipeline {
    pub fn new(
        corpus_dir: PathBuf,
        contextualizer: Arc<dyn Contextualizer>,
        accountant: Arc<TokenAccountant>,
        gate: Arc<RateGate>,
        workers: usize,
    ) -> Self {
        Self {
            corpus_dir,
            contextualizer,
            accountant,
            gate,
            workers,
        }
    }

    /// Process a single chunk into an embeddable record.
    ///
    /// Takes a rate gate slot before doing anything else, so a load run
    /// paces uniformly per chunk whether or not the chunk ends up making
    /// an enrichment call. Chunks whose chapter has no matching corpus
    /// file, and chunks whose document cannot be read, fall back to
    /// embedding the raw chunk text with an empty annotation.
    pub async fn process_one(&self, chunk: &Chunk) -> EnrichedRecord {
        self.gate.acquire().await;

        let Some(path) = corpus::find_document(&self.corpus_dir, &chunk.chapter_title) else {
            return unenriched(chunk);
        };

        let document = match corpus::read_document(&path) {
            Ok(document) => document,
            Err(e) => {
                eprintln!("Warning: skipping enrichment for {}: {}", chunk.chunk_id, e);
                return unenriched(chunk);
            }
        };

        let (annotation, usage) = self.contextualizer.situate(&document, &chunk.text).await;
        self.accountant.record(usage.as_ref());

        EnrichedRecord {
            text_to_embed: format!("{}\n\n{}", chunk.text, annotation),
            metadata: ChunkMetadata {
                chunk_id: chunk.chunk_id.clone(),
                chapter_title: chunk.chapter_title.clone(),
                original_content: chunk.text.clone(),
                contextualized_content: annotation,
            },
        }
    }

    /// Process every chunk in `dataset`, preserving dataset order in the
    /// output regardless of completion order.
    pub async fn process_all(
        &self,
        dataset: &[Chunk],
        progress: &dyn LoadProgressReporter,
    ) -> Result<Vec<EnrichedRecord>> {
        let total = dataset.len() as u64;

        if self.workers <= 1 {
            let mut records = Vec::with_capacity(dataset.len());
            for chunk in dataset {
                records.push(self.process_one(chunk).await);
                progress.report(LoadProgressEvent::Enriching {
                    n: records.len() as u64,
                    total,
                });
            }
            return Ok(records);
        }

        // Bounded fan-out: the dispatch loop blocks on a permit, so at
        // most `workers` chunks are in flight at once. Handles are
        // awaited in submission order, which keeps the output aligned
        // with the dataset.
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(dataset.len());
        for chunk in dataset.iter().cloned() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .context("enrichment worker pool closed")?;
            let pipeline = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                pipeline.process_one(&chunk).await
            }));
        }

        let mut records = Vec::with_capacity(handles.len());
        for handle in handles {
            let record = handle.await.context("enrichment worker task failed")?;
            records.push(record);
            progress.report(LoadProgressEvent::Enriching {
                n: records.len() as u64,
                total,
            });
        }
        Ok(records)
    }
}

/// Record for a chunk that gets no annotation: the raw text is embedded
/// as-is and the stored annotation is empty.
fn unenriched(chunk: &Chunk) -> EnrichedRecord {
    EnrichedRecord {
        text_to_embed: chunk.text.clone(),
        metadata: ChunkMetadata {
            chunk_id: chunk.chunk_id.clone(),
            chapter_title: chunk.chapter_title.clone(),
            original_content: chunk.text.clone(),
            contextualized_content: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::TokenUsage;
    use crate::progress::NoProgress;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubContextualizer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubContextualizer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait::async_trait]
    impl Contextualizer for StubContextualizer {
        async fn situate(&self, document: &str, chunk: &str) -> (String, Option<TokenUsage>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return (String::new(), None);
            }
            // Delay inversely to the chunk's trailing digit so later
            // chunks finish first under concurrency.
            if let Some(n) = chunk.chars().last().and_then(|c| c.to_digit(10)) {
                tokio::time::sleep(Duration::from_millis(u64::from(40 - n * 10))).await;
            }
            (
                format!("situates {} words of {}", chunk.len(), document.len()),
                Some(TokenUsage {
                    input_tokens: 100,
                    output_tokens: 10,
                    cache_read_input_tokens: 0,
                    cache_creation_input_tokens: 90,
                }),
            )
        }
    }

    fn pipeline_with(
        corpus_dir: &std::path::Path,
        contextualizer: Arc<StubContextualizer>,
        workers: usize,
    ) -> (ChunkPipeline, Arc<TokenAccountant>) {
        let accountant = Arc::new(TokenAccountant::new());
        let pipeline = ChunkPipeline::new(
            corpus_dir.to_path_buf(),
            contextualizer,
            Arc::clone(&accountant),
            Arc::new(RateGate::with_interval(Duration::ZERO)),
            workers,
        );
        (pipeline, accountant)
    }

    fn chunk(id: &str, title: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            chapter_title: title.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn unmatched_chunk_embeds_raw_text_without_an_enrichment_call() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubContextualizer::new());
        let (pipeline, accountant) = pipeline_with(dir.path(), Arc::clone(&stub), 1);

        let record = pipeline
            .process_one(&chunk("c1", "Nowhere", "Yudhishthira was born."))
            .await;

        assert_eq!(record.text_to_embed, "Yudhishthira was born.");
        assert_eq!(record.metadata.contextualized_content, "");
        assert_eq!(record.metadata.original_content, "Yudhishthira was born.");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
        assert_eq!(accountant.totals().input, 0);
    }

    #[tokio::test]
    async fn matched_chunk_concatenates_annotation_after_blank_line() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01_Adi_Parva.txt"), "the whole chapter").unwrap();
        let stub = Arc::new(StubContextualizer::new());
        let (pipeline, accountant) = pipeline_with(dir.path(), Arc::clone(&stub), 1);

        let record = pipeline
            .process_one(&chunk("c1", "Adi_Parva", "A passage."))
            .await;

        let annotation = format!("situates {} words of {}", "A passage.".len(), 17);
        assert_eq!(record.text_to_embed, format!("A passage.\n\n{}", annotation));
        assert_eq!(record.metadata.contextualized_content, annotation);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        let totals = accountant.totals();
        assert_eq!(totals.input, 100);
        assert_eq!(totals.output, 10);
        assert_eq!(totals.cache_creation, 90);
    }

    #[tokio::test]
    async fn failed_enrichment_still_produces_a_record() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Sabha.txt"), "doc").unwrap();
        let stub = Arc::new(StubContextualizer::failing());
        let (pipeline, accountant) = pipeline_with(dir.path(), Arc::clone(&stub), 1);

        let record = pipeline.process_one(&chunk("c2", "Sabha", "The court.")).await;

        // The call was made but yielded nothing usable.
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(record.text_to_embed, "The court.\n\n");
        assert_eq!(record.metadata.contextualized_content, "");
        assert_eq!(accountant.totals().output, 0);
    }

    #[tokio::test]
    async fn process_all_keeps_dataset_order_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubContextualizer::new());
        let (pipeline, _) = pipeline_with(dir.path(), stub, 1);

        let dataset = vec![
            chunk("c0", "None", "zero"),
            chunk("c1", "None", "one"),
            chunk("c2", "None", "two"),
        ];
        let records = pipeline.process_all(&dataset, &NoProgress).await.unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.metadata.chunk_id.as_str()).collect();
        assert_eq!(ids, ["c0", "c1", "c2"]);
    }

    #[tokio::test]
    async fn process_all_keeps_dataset_order_with_workers() {
        let dir = tempfile::tempdir().unwrap();
        for title in ["Alpha", "Bravo", "Charlie", "Delta"] {
            std::fs::write(dir.path().join(format!("{}.txt", title)), "doc").unwrap();
        }
        let stub = Arc::new(StubContextualizer::new());
        let (pipeline, _) = pipeline_with(dir.path(), Arc::clone(&stub), 4);

        // The stub sleeps longest for chunk 0, so completions arrive in
        // roughly reverse order.
        let dataset = vec![
            chunk("c0", "Alpha", "passage 0"),
            chunk("c1", "Bravo", "passage 1"),
            chunk("c2", "Charlie", "passage 2"),
            chunk("c3", "Delta", "passage 3"),
        ];
        let records = pipeline.process_all(&dataset, &NoProgress).await.unwrap();

        assert_eq!(stub.calls.load(Ordering::SeqCst), 4);
        let ids: Vec<&str> = records.iter().map(|r| r.metadata.chunk_id.as_str()).collect();
        assert_eq!(ids, ["c0", "c1", "c2", "c3"]);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.metadata.original_content, format!("passage {}", i));
        }
    }
}
