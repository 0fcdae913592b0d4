//! # Context Vault
//!
//! A contextual retrieval engine for chunked text corpora.
//!
//! Context Vault enriches raw text chunks with document-level context
//! before embedding them: each chunk is paired with its source document,
//! annotated by an LLM with a short situating note, embedded together
//! with that note, and committed to a durable single-file store. Search
//! embeds the query (cached per query string), ranks every stored vector
//! by dot product, and returns the top-k results as formatted context
//! blocks ready for a downstream answer-generation step.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌────────────┐
//! │   Dataset    │──▶│   Pipeline     │──▶│   Store     │
//! │ chunks+docs  │   │ situate+embed │   │ vec+meta   │
//! └──────────────┘   └───────────────┘   └─────┬──────┘
//!                                              │
//!                          ┌───────────────────┤
//!                          ▼                   ▼
//!                     ┌──────────┐       ┌──────────┐
//!                     │   CLI    │       │ Artifact │
//!                     │  (ctxv)  │       │  (.bin)  │
//!                     └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export ANTHROPIC_API_KEY=sk-ant-...   # chunk enrichment
//! export VOYAGE_API_KEY=pa-...          # embeddings
//!
//! ctxv load ./data/chunks.json          # enrich, embed, commit
//! ctxv search "who won the dice game"   # top-k formatted contexts
//! ctxv stats                            # artifact overview
//! ctxv validate                         # duplicate-content check
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`corpus`] | Source document matching |
//! | [`enrich`] | Anthropic contextualizer |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`gate`] | Outbound request pacing |
//! | [`usage`] | Token accounting |
//! | [`situate`] | Chunk enrichment pipeline |
//! | [`store`] | The contextual vector store |
//! | [`persist`] | Store artifact encode/decode |
//! | [`progress`] | Load progress reporting |

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod enrich;
pub mod gate;
pub mod load;
pub mod models;
pub mod persist;
pub mod progress;
pub mod search;
pub mod situate;
pub mod stats;
pub mod store;
pub mod usage;
