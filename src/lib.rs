//! # Groundwire
//!
//! A provenance-verified context ingestion and grounded generation
//! pipeline.
//!
//! Groundwire ingests source documents (web pages, files), verifies and
//! fingerprints them, splits them into overlapping token chunks, embeds
//! each chunk, and stores the vectors with provenance metadata in a
//! namespaced similarity index. At generation time it retrieves the
//! top-matching verified chunks for a topic and assembles them into a
//! grounded context block for text generation — refusing to fabricate
//! when no verified context exists.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────────────┐   ┌───────────┐
//! │  Sources  │──▶│      Pipeline       │──▶│  Vector   │
//! │  URL/File │   │ Verify+Chunk+Embed  │   │  Index    │
//! └───────────┘   └─────────────────────┘   └─────┬─────┘
//!                                                 │
//!                 ┌───────────┐   ┌───────────┐   │
//!                 │  Grounded │◀──│ Retriever │◀──┘
//!                 │ Generation│   │ (verified │
//!                 │  + Report │   │   only)   │
//!                 └───────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gw init                                   # create database
//! gw add org_website --kind website --url https://example.org
//! gw verify org_website                     # fingerprint + audit log
//! gw ingest org_website --section overview  # chunk, embed, upsert
//! gw query "mission statement"              # verified retrieval
//! gw generate --out report.md               # grounded report
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`verify`] | Source fetching and fingerprinting |
//! | [`chunk`] | Overlapping token-window chunking |
//! | [`tokenize`] | Token encodings behind the `Tokenizer` trait |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`retry`] | Explicit retry policy with backoff |
//! | [`index`] | Namespaced vector index backends |
//! | [`ingest`] | Pipeline orchestration |
//! | [`retrieve`] | Provenance-filtered retrieval |
//! | [`generate`] | Grounded section generation and reports |
//! | [`sources`] | Persistent source registry |
//! | [`audit`] | Append-only verification log |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod audit;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod retry;
pub mod sources;
pub mod tokenize;
pub mod verify;

pub use error::{Error, Result};
