//! Error types for the groundwire pipeline.

use thiserror::Error;

/// Result type alias using groundwire's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pipeline operations.
///
/// Verification and indexing failures are fatal to the single source or
/// chunk being processed but must not abort sibling items in a batch;
/// batch flows collect per-item outcomes instead of propagating these.
#[derive(Error, Debug)]
pub enum Error {
    /// The source locator could not be read (missing file, network/HTTP error).
    #[error("source '{source_id}' unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// The source was readable but contained zero bytes.
    #[error("source '{source_id}' is empty")]
    SourceEmpty { source_id: String },

    /// Chunking parameters violate `0 <= overlap < chunk_size`.
    #[error("invalid chunk params: chunk_size={chunk_size}, overlap={overlap}")]
    InvalidChunkParams { chunk_size: usize, overlap: usize },

    /// Embedding call failed after the retry policy was exhausted,
    /// or was rejected outright for a non-retryable cause.
    #[error("embedding unavailable after {attempts} attempt(s): {cause}")]
    EmbeddingUnavailable { attempts: u32, cause: String },

    /// A namespace already exists with a different configured dimension,
    /// or a record's vector does not match the namespace dimension.
    #[error("dimension mismatch in namespace '{namespace}': expected {expected}, got {actual}")]
    DimensionMismatch {
        namespace: String,
        expected: usize,
        actual: usize,
    },

    /// A batch within an upsert failed. Batches before `batch_index`
    /// were applied; nothing after it was attempted.
    #[error("upsert to '{namespace}' failed at batch {batch_index} ({batches_applied} batch(es) applied): {reason}")]
    UpsertFailed {
        namespace: String,
        batch_index: usize,
        batches_applied: usize,
        reason: String,
    },

    /// Malformed query (e.g. `top_k == 0`).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Retrieval found matches, but none carried verified provenance.
    /// A meaningful outcome, not a transport failure.
    #[error("no verified matches for query: {query}")]
    NoVerifiedMatches { query: String },

    /// The text-generation backend failed. Not retried internally.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// Unknown source id in the registry.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O operation failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_source_unavailable() {
        let err = Error::SourceUnavailable {
            source_id: "org_website".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "source 'org_website' unavailable: connection refused"
        );
    }

    #[test]
    fn test_display_upsert_failed_carries_batch_index() {
        let err = Error::UpsertFailed {
            namespace: "default".into(),
            batch_index: 3,
            batches_applied: 3,
            reason: "timeout".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("batch 3"));
        assert!(msg.contains("3 batch(es) applied"));
    }

    #[test]
    fn test_no_verified_matches_is_distinguishable() {
        let err = Error::NoVerifiedMatches {
            query: "budget".into(),
        };
        assert!(matches!(err, Error::NoVerifiedMatches { .. }));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
