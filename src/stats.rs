//! Store statistics and artifact health overview.
//!
//! Provides a quick summary of what's stored: record counts, embedding
//! dimensionality, annotation coverage, and query cache size. Used by
//! `ctxv stats` to give confidence that loads are working as expected.

use std::collections::HashSet;

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::models::ChunkMetadata;
use crate::persist;
use crate::store::StoreError;

/// Run the stats command: read the artifact and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let path = config.store.artifact_path();
    if !path.exists() {
        return Err(StoreError::ArtifactNotFound(path).into());
    }

    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    let artifact = persist::read_artifact(&path)?;

    let records = artifact.metadata.len();
    let annotated = artifact
        .metadata
        .iter()
        .filter(|m| !m.contextualized_content.is_empty())
        .count();
    let dim = artifact.embeddings.first().map(Vec::len).unwrap_or(0);

    println!("Context Vault — Store Stats");
    println!("===========================");
    println!();
    println!("  Store:       {}", config.store.name);
    println!("  Artifact:    {}", path.display());
    println!("  Size:        {}", format_bytes(size));
    println!("  Saved:       {}", format_ts_relative(artifact.saved_at));
    println!();
    println!("  Records:     {}", records);
    println!("  Dimension:   {}", dim);
    println!(
        "  Annotated:   {} / {} ({}%)",
        annotated,
        records,
        if records > 0 { (annotated * 100) / records } else { 0 }
    );
    println!("  Query cache: {} entries", artifact.query_cache.len());
    println!();

    Ok(())
}

/// Run the validate command: check stored chunks for duplicate content.
pub fn run_validate(config: &Config) -> Result<()> {
    let path = config.store.artifact_path();
    if !path.exists() {
        return Err(StoreError::ArtifactNotFound(path).into());
    }
    let artifact = persist::read_artifact(&path)?;
    let unique = unique_contents(&artifact.metadata);

    println!("validate {}", config.store.name);
    println!("  embedded chunks: {}", artifact.metadata.len());
    println!("  unique contents: {}", unique);
    if unique == artifact.metadata.len() {
        println!("  all embedded chunks are unique");
    } else {
        println!("  duplicates: {}", artifact.metadata.len() - unique);
    }
    println!("ok");
    Ok(())
}

/// Count distinct `original_content` values by digest.
fn unique_contents(metadata: &[ChunkMetadata]) -> usize {
    let mut digests: HashSet<String> = HashSet::new();
    for meta in metadata {
        let mut hasher = Sha256::new();
        hasher.update(meta.original_content.as_bytes());
        digests.insert(format!("{:x}", hasher.finalize()));
    }
    digests.len()
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
