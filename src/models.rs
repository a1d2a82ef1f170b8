//! Core data models used throughout Groundwire.
//!
//! These types represent the sources, verification records, chunks, and
//! indexed vectors that flow through the ingestion and retrieval pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of source a document was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A public web page (e.g. an official website).
    Website,
    /// A local file on disk.
    File,
    /// A published report or registry extract, read from disk.
    Report,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Website => write!(f, "website"),
            Self::File => write!(f, "file"),
            Self::Report => write!(f, "report"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "website" => Ok(Self::Website),
            "file" => Ok(Self::File),
            "report" => Ok(Self::Report),
            _ => Err(format!("invalid source kind: {}", s)),
        }
    }
}

/// Where a source's raw bytes live. Bytes are fetched lazily at
/// verification time and never persisted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locator {
    Url(String),
    Path(PathBuf),
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(u) => write!(f, "{}", u),
            Self::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// A registered data source. Immutable once verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub kind: SourceKind,
    pub locator: Locator,
}

/// Immutable proof that a source's content was captured and fingerprinted.
///
/// Re-verifying a source produces a new record that supersedes the old
/// one for trust purposes; both are retained in the append-only
/// verification log for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub source_id: String,
    /// Lowercase-hex SHA-256 digest of the exact bytes read.
    pub content_hash: String,
    pub captured_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Best-effort, source-dependent.
    pub content_type: Option<String>,
    /// Best-effort, source-dependent.
    pub last_modified: Option<String>,
    pub verified: bool,
}

/// A source whose content has passed verification.
///
/// Only constructible by the verifier, so unverified data cannot reach
/// the chunking/embedding path by construction.
#[derive(Debug, Clone)]
pub struct VerifiedSource {
    source: Source,
    record: VerificationRecord,
    text: String,
}

impl VerifiedSource {
    pub(crate) fn new(source: Source, record: VerificationRecord, text: String) -> Self {
        Self {
            source,
            record,
            text,
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn record(&self) -> &VerificationRecord {
        &self.record
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Chunk size and overlap for one processing run, recorded alongside
/// every chunk for reproducibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkingParams {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Token distance between consecutive window starts.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// An overlapping token window of a source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub source_id: String,
    /// Zero-based window index.
    pub index: usize,
    pub token_count: usize,
    pub text: String,
    pub params: ChunkingParams,
}

/// Fixed-schema metadata stored with every indexed vector.
///
/// Required provenance fields are typed; source-specific extras go in
/// the `extra` map so forward compatibility never erodes type safety
/// on `verified`, `source_id`, and `section`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub text: String,
    pub chunk_index: usize,
    pub source_id: String,
    /// Section/category tag this chunk was ingested under.
    pub section: String,
    pub captured_at: DateTime<Utc>,
    pub verification: VerificationRecord,
    /// Duplicated at top level for cheap filtering.
    pub verified: bool,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// A vector plus provenance metadata, as stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedRecord {
    /// Unique within a namespace: `"{source_id}:{chunk_index}"`, so
    /// re-ingesting a source upserts its own vectors in place.
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl IndexedRecord {
    pub fn vector_id(source_id: &str, chunk_index: usize) -> String {
        format!("{}:{}", source_id, chunk_index)
    }
}

/// An indexed record with its similarity score for one query.
///
/// Ordered by descending score; equal scores order by ascending
/// vector id for determinism.
#[derive(Debug, Clone)]
pub struct RetrievalMatch {
    pub record: IndexedRecord,
    pub score: f32,
}

/// One row of the append-only verification log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationLogEntry {
    pub source_id: String,
    pub record: VerificationRecord,
    pub logged_at: DateTime<Utc>,
}
