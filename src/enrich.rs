//! Rate-limited enrichment client.
//!
//! Turns a (document, chunk) pair into a short situating annotation by
//! calling the Anthropic Messages API. The full document travels as the
//! first content block with an ephemeral `cache_control` marker so repeated
//! calls against the same document hit the provider's prompt cache.
//!
//! Failure policy: a failed call degrades to an empty annotation with a
//! stderr warning. One bad chunk must never abort a whole dataset load, so
//! nothing here propagates as a fatal error. Pacing is owned by the caller
//! through the shared [`crate::gate::RateGate`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EnrichmentConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Per-call token usage reported by the Messages API.
///
/// The cache counters are absent from the wire response when prompt caching
/// was not involved, so they default to zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

/// Produces situating annotations for chunks.
///
/// Object-safe so the pipeline can run against a stub in tests.
#[async_trait]
pub trait Contextualizer: Send + Sync {
    /// Annotate `chunk` with its place in `document`.
    ///
    /// Returns the annotation and the call's token usage, or an empty
    /// annotation and `None` when the call failed.
    async fn situate(&self, document: &str, chunk: &str) -> (String, Option<TokenUsage>);
}

/// Cache control marker for Anthropic prompt caching.
#[derive(Debug, Clone, Serialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub control_type: String,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        Self {
            control_type: "ephemeral".to_string(),
        }
    }
}

/// Request-side text content block with optional cache_control.
#[derive(Debug, Clone, Serialize)]
struct TextBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

impl TextBlock {
    fn text(content: impl Into<String>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: content.into(),
            cache_control: None,
        }
    }

    fn cached_text(content: impl Into<String>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: content.into(),
            cache_control: Some(CacheControl::ephemeral()),
        }
    }
}

#[derive(Debug, Serialize)]
struct UserMessage {
    role: String,
    content: Vec<TextBlock>,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<UserMessage>,
}

/// Response content block; unknown block types are tolerated and skipped.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    usage: TokenUsage,
}

fn document_prompt(document: &str) -> String {
    format!("<document>\n{}\n</document>", document)
}

fn chunk_prompt(chunk: &str) -> String {
    format!(
        "Here is the chunk we want to situate within the whole document\n\
         <chunk>\n\
         {}\n\
         </chunk>\n\
         \n\
         Please give a short succinct context to situate this chunk within the overall document \
         for the purposes of improving search retrieval of the chunk.\n\
         Answer only with the succinct context and nothing else.",
        chunk
    )
}

/// Enrichment client backed by the Anthropic Messages API.
///
/// Requires the `ANTHROPIC_API_KEY` environment variable.
pub struct AnthropicContextualizer {
    client: reqwest::Client,
    config: EnrichmentConfig,
    api_key: String,
}

impl AnthropicContextualizer {
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    async fn request_annotation(&self, document: &str, chunk: &str) -> Result<(String, TokenUsage)> {
        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: 0.0,
            messages: vec![UserMessage {
                role: "user".to_string(),
                content: vec![
                    TextBlock::cached_text(document_prompt(document)),
                    TextBlock::text(chunk_prompt(chunk)),
                ],
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Anthropic API error {}: {}", status, body);
        }

        let parsed: MessagesResponse = response.json().await?;

        let annotation = parsed
            .content
            .iter()
            .find_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .ok_or_else(|| anyhow::anyhow!("Anthropic response contained no text block"))?;

        Ok((annotation, parsed.usage))
    }
}

#[async_trait]
impl Contextualizer for AnthropicContextualizer {
    async fn situate(&self, document: &str, chunk: &str) -> (String, Option<TokenUsage>) {
        match self.request_annotation(document, chunk).await {
            Ok((annotation, usage)) => (annotation, Some(usage)),
            Err(e) => {
                eprintln!("Warning: enrichment call failed: {}", e);
                (String::new(), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_puts_cache_control_on_the_document_block_only() {
        let request = MessagesRequest {
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            messages: vec![UserMessage {
                role: "user".to_string(),
                content: vec![
                    TextBlock::cached_text(document_prompt("full document")),
                    TextBlock::text(chunk_prompt("one chunk")),
                ],
            }],
        };

        let json = serde_json::to_value(&request).unwrap();
        let blocks = &json["messages"][0]["content"];
        assert_eq!(blocks[0]["cache_control"]["type"], "ephemeral");
        assert!(blocks[1].get("cache_control").is_none());
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["max_tokens"], 1024);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn prompts_wrap_document_and_chunk_in_tags() {
        let doc = document_prompt("the whole text");
        assert!(doc.starts_with("<document>\n"));
        assert!(doc.ends_with("\n</document>"));
        assert!(doc.contains("the whole text"));

        let chunk = chunk_prompt("a fragment");
        assert!(chunk.contains("<chunk>\na fragment\n</chunk>"));
        assert!(chunk.contains("short succinct context"));
        assert!(chunk.ends_with("nothing else."));
    }

    #[test]
    fn response_parse_takes_first_text_block_and_skips_unknown() {
        let body = r#"{
            "content": [
                {"type": "server_tool_use", "id": "x", "name": "n"},
                {"type": "text", "text": "This chunk describes the birth of Yudhishthira."},
                {"type": "text", "text": "second"}
            ],
            "usage": {"input_tokens": 2100, "output_tokens": 31}
        }"#;

        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        let annotation = parsed
            .content
            .iter()
            .find_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap();

        assert_eq!(annotation, "This chunk describes the birth of Yudhishthira.");
        assert_eq!(parsed.usage.input_tokens, 2100);
        assert_eq!(parsed.usage.output_tokens, 31);
        // Cache counters absent from the wire default to zero.
        assert_eq!(parsed.usage.cache_read_input_tokens, 0);
        assert_eq!(parsed.usage.cache_creation_input_tokens, 0);
    }

    #[test]
    fn usage_parses_cache_counters_when_present() {
        let usage: TokenUsage = serde_json::from_str(
            r#"{"input_tokens": 10, "output_tokens": 3,
                "cache_read_input_tokens": 1900, "cache_creation_input_tokens": 45}"#,
        )
        .unwrap();
        assert_eq!(usage.cache_read_input_tokens, 1900);
        assert_eq!(usage.cache_creation_input_tokens, 45);
    }
}
