//! The `search` command: rank stored records against a query and print
//! the formatted context blocks.

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::embedding::VoyageProvider;
use crate::store::ContextualStore;

pub async fn run_search(config: &Config, query: &str, k: usize) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let embedder = Arc::new(VoyageProvider::new(&config.embedding)?);
    let mut store = ContextualStore::open(
        config.store.name.as_str(),
        config.store.artifact_path(),
        embedder,
        config.embedding.batch_size,
    )?;

    let results = store.search(query, k).await?;
    println!("{}", results);
    Ok(())
}
