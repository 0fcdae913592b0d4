//! Embedding provider abstraction and the Voyage AI implementation.
//!
//! Defines the [`EmbeddingProvider`] trait and [`VoyageProvider`], which
//! calls the Voyage embeddings API with retry and backoff. Batching is the
//! store's concern; a provider embeds exactly the texts it is handed.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Trait for embedding providers.
///
/// Implementations must be `Send + Sync`; the store holds one behind an
/// `Arc` and tests substitute counting stubs.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"voyage-3.5-lite"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
    index: usize,
}

/// Embedding provider using the Voyage AI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `VOYAGE_API_KEY` environment variable to be set.
pub struct VoyageProvider {
    client: reqwest::Client,
    config: EmbeddingConfig,
    api_key: String,
}

impl VoyageProvider {
    /// Create a new Voyage provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `VOYAGE_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("VOYAGE_API_KEY")
            .map_err(|_| anyhow::anyhow!("VOYAGE_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    async fn call_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingsRequest {
            input: texts,
            model: &self.config.model,
        };

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/v1/embeddings", self.config.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: EmbeddingsResponse = response.json().await?;
                        return collect_vectors(parsed, texts.len());
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Voyage API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Voyage API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

#[async_trait]
impl EmbeddingProvider for VoyageProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.call_api(texts).await
    }
}

/// Reassemble response entries into input order and validate the count.
///
/// The API reports each vector's position in an `index` field; entries are
/// sorted by it rather than trusting wire order.
fn collect_vectors(response: EmbeddingsResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut data = response.data;
    if data.len() != expected {
        bail!(
            "Voyage response had {} embeddings for {} inputs",
            data.len(),
            expected
        );
    }

    data.sort_by_key(|entry| entry.index);

    for (position, entry) in data.iter().enumerate() {
        if entry.index != position {
            bail!(
                "Voyage response indexes are not a permutation of 0..{}",
                expected
            );
        }
    }

    Ok(data.into_iter().map(|entry| entry.embedding).collect())
}
