//! The `load` command: read a chunk dataset, enrich each chunk against
//! its source document, embed everything, and commit the store.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::corpus;
use crate::embedding::VoyageProvider;
use crate::enrich::AnthropicContextualizer;
use crate::gate::RateGate;
use crate::models;
use crate::progress::{format_number, ProgressMode};
use crate::situate::ChunkPipeline;
use crate::store::{ContextualStore, LoadOutcome};
use crate::usage::TokenAccountant;

pub async fn run_load(
    config: &Config,
    dataset_path: &Path,
    workers_override: Option<usize>,
    dry_run: bool,
    progress: &str,
) -> Result<()> {
    let mode = match progress {
        "auto" => ProgressMode::default_for_tty(),
        "human" => ProgressMode::Human,
        "json" => ProgressMode::Json,
        "off" => ProgressMode::Off,
        _ => bail!(
            "Unknown progress mode: {}. Use auto, human, json, or off.",
            progress
        ),
    };

    let dataset = models::read_dataset(dataset_path)?;
    let workers = workers_override.unwrap_or(config.pipeline.workers).max(1);

    if dry_run {
        let matched = dataset
            .iter()
            .filter(|c| corpus::find_document(&config.corpus.dir, &c.chapter_title).is_some())
            .count();
        println!("load {} (dry-run)", config.store.name);
        println!("  chunks in dataset: {}", dataset.len());
        println!("  with matching documents: {}", matched);
        println!("  without matching documents: {}", dataset.len() - matched);
        return Ok(());
    }

    let contextualizer = Arc::new(AnthropicContextualizer::new(&config.enrichment)?);
    let embedder = Arc::new(VoyageProvider::new(&config.embedding)?);
    let accountant = Arc::new(TokenAccountant::new());
    let gate = Arc::new(RateGate::new(config.enrichment.requests_per_minute));

    let pipeline = ChunkPipeline::new(
        config.corpus.dir.clone(),
        contextualizer,
        Arc::clone(&accountant),
        gate,
        workers,
    );

    let mut store = ContextualStore::open(
        config.store.name.as_str(),
        config.store.artifact_path(),
        embedder,
        config.embedding.batch_size,
    )?;

    let reporter = mode.reporter();
    let outcome = store
        .load_data(&dataset, &pipeline, reporter.as_ref())
        .await?;

    match outcome {
        LoadOutcome::AlreadyLoaded { records } => {
            println!("load {}", config.store.name);
            println!("  already loaded: {} records", records);
        }
        LoadOutcome::Loaded { records, annotated } => {
            let totals = accountant.totals();
            println!("load {}", config.store.name);
            println!("  chunks processed: {}", records);
            println!("  annotated: {}", annotated);
            println!("  artifact: {}", store.artifact_path().display());
            println!("  input tokens: {}", format_number(totals.input));
            println!("  output tokens: {}", format_number(totals.output));
            println!("  cache read tokens: {}", format_number(totals.cache_read));
            println!(
                "  cache creation tokens: {}",
                format_number(totals.cache_creation)
            );
        }
    }
    println!("ok");
    Ok(())
}
