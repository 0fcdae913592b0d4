//! # Context Vault CLI (`ctxv`)
//!
//! The `ctxv` binary is the primary interface for Context Vault. It
//! provides commands for loading a chunk dataset into the store,
//! searching it, and inspecting the persisted artifact.
//!
//! ## Usage
//!
//! ```bash
//! ctxv --config ./config/ctxv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctxv load <dataset.json>` | Enrich, embed, and commit a chunk dataset |
//! | `ctxv search "<query>"` | Rank stored chunks against a query |
//! | `ctxv stats` | Show store artifact statistics |
//! | `ctxv validate` | Check stored chunks for duplicate content |
//!
//! ## Examples
//!
//! ```bash
//! # Load a dataset with four enrichment workers
//! ctxv load ./data/chunks.json --workers 4 --config ./config/ctxv.toml
//!
//! # Preview what a load would touch, without any API calls
//! ctxv load ./data/chunks.json --dry-run
//!
//! # Search with a custom result count
//! ctxv search "the burning of the lacquer house" -k 5
//!
//! # Inspect the persisted artifact
//! ctxv stats --config ./config/ctxv.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use context_vault::{config, load, search, stats, store};

/// Context Vault CLI — a contextual retrieval engine for chunked text
/// corpora.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ctxv.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ctxv",
    about = "Context Vault — contextual chunk enrichment, embedding storage, and top-k context search",
    version,
    long_about = "Context Vault enriches text chunks with document-level context before embedding \
    them, persists the vectors and metadata as a single durable artifact, and serves ranked, \
    formatted context blocks for retrieval-augmented generation."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ctxv.toml`. Store, corpus, enrichment, and
    /// embedding settings are read from this file.
    #[arg(long, global = true, default_value = "./config/ctxv.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Load a chunk dataset into the store.
    ///
    /// Reads a JSON array of chunks, situates each chunk within its
    /// source document via the enrichment provider, embeds the enriched
    /// texts in batches, and commits vectors plus metadata to the store
    /// artifact. A store that already holds data is left untouched.
    ///
    /// Requires `ANTHROPIC_API_KEY` and `VOYAGE_API_KEY` in the
    /// environment, even when the store is already loaded; only
    /// `--dry-run` runs without them.
    Load {
        /// Path to the dataset file (a JSON array of chunk objects).
        dataset: PathBuf,

        /// Number of concurrent enrichment workers. Overrides the
        /// `[pipeline].workers` config setting.
        #[arg(long)]
        workers: Option<usize>,

        /// Dry run — report dataset and corpus match counts without
        /// calling any provider or writing the artifact.
        #[arg(long)]
        dry_run: bool,

        /// Progress reporting on stderr: `auto`, `human`, `json`, or `off`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Search the store for a query.
    ///
    /// Embeds the query (reusing the per-query cache when possible),
    /// scores it against every stored vector, and prints the top-k
    /// results as formatted context blocks.
    ///
    /// Requires `VOYAGE_API_KEY` in the environment; the embedding
    /// client is set up before the store is consulted, so the key is
    /// needed even for cached queries.
    Search {
        /// The search query string.
        query: String,

        /// Number of context blocks to return.
        #[arg(short, long, default_value_t = store::DEFAULT_TOP_K)]
        k: usize,
    },

    /// Show store artifact statistics.
    ///
    /// Reads the persisted artifact directly; no provider credentials
    /// are needed.
    Stats,

    /// Check stored chunks for duplicate content.
    ///
    /// Compares every stored chunk's original content by digest and
    /// reports how many are distinct.
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Load {
            dataset,
            workers,
            dry_run,
            progress,
        } => {
            load::run_load(&cfg, &dataset, workers, dry_run, &progress).await?;
        }
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Validate => {
            stats::run_validate(&cfg)?;
        }
    }

    Ok(())
}
