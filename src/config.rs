use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Store instance name; the artifact lives at `<data_dir>/<name>/store.bin`.
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StoreConfig {
    /// Derived artifact path for this store instance.
    pub fn artifact_path(&self) -> PathBuf {
        self.data_dir.join(&self.name).join("store.bin")
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Directory holding one source document per file, matched by filename.
    #[serde(default = "default_corpus_dir")]
    pub dir: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: default_corpus_dir(),
        }
    }
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("./merged_data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_enrichment_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// External quota: at most this many enrichment calls per minute.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_enrichment_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_enrichment_base_url")]
    pub base_url: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            model: default_enrichment_model(),
            max_tokens: default_max_tokens(),
            requests_per_minute: default_requests_per_minute(),
            timeout_secs: default_enrichment_timeout_secs(),
            base_url: default_enrichment_base_url(),
        }
    }
}

fn default_enrichment_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_requests_per_minute() -> u32 {
    60
}
fn default_enrichment_timeout_secs() -> u64 {
    60
}
fn default_enrichment_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
            base_url: default_embedding_base_url(),
        }
    }
}

fn default_embedding_model() -> String {
    "voyage-3.5-lite".to_string()
}
fn default_batch_size() -> usize {
    128
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_embedding_base_url() -> String {
    "https://api.voyageai.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Bounded worker-pool size for chunk processing; 1 = sequential.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    1
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate store
    if config.store.name.trim().is_empty() {
        anyhow::bail!("store.name must not be empty");
    }

    // Validate enrichment
    if config.enrichment.requests_per_minute == 0 {
        anyhow::bail!("enrichment.requests_per_minute must be > 0");
    }
    if config.enrichment.model.trim().is_empty() {
        anyhow::bail!("enrichment.model must not be empty");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.model.trim().is_empty() {
        anyhow::bail!("embedding.model must not be empty");
    }

    // Validate pipeline
    if config.pipeline.workers == 0 {
        anyhow::bail!("pipeline.workers must be >= 1");
    }

    Ok(config)
}
