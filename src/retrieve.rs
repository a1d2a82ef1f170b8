//! Retrieval with provenance filtering.
//!
//! Embeds a query, searches the index, and discards any match whose
//! metadata is not marked verified, warning once per discard. An empty
//! result after filtering is [`Error::NoVerifiedMatches`] — a meaningful
//! outcome, distinct from any transport-level failure.

use std::sync::Arc;

use tracing::warn;

use crate::embedding::{embed_with_retry, Embedder};
use crate::error::{Error, Result};
use crate::index::{MetadataFilter, VectorIndex};
use crate::models::RetrievalMatch;
use crate::retry::RetryPolicy;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    retry: RetryPolicy,
    namespace: String,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        retry: RetryPolicy,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            retry,
            namespace: namespace.into(),
        }
    }

    /// Top-k retrieval of verified matches for a query.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalMatch>> {
        self.retrieve_filtered(query, top_k, None).await
    }

    /// Like [`retrieve`](Self::retrieve), with an additional metadata
    /// filter applied at the index.
    pub async fn retrieve_filtered(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalMatch>> {
        let texts = [query.to_string()];
        let vectors = embed_with_retry(self.embedder.as_ref(), &self.retry, &texts).await?;
        let query_vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingUnavailable {
                attempts: 1,
                cause: "empty embedding response".into(),
            })?;

        let matches = self
            .index
            .query(&self.namespace, &query_vector, top_k, filter)
            .await?;

        let verified: Vec<RetrievalMatch> = matches
            .into_iter()
            .filter(|m| {
                if m.record.metadata.verified && m.record.metadata.verification.verified {
                    true
                } else {
                    warn!(
                        vector_id = %m.record.id,
                        source_id = %m.record.metadata.source_id,
                        "discarding match without verified provenance"
                    );
                    false
                }
            })
            .collect();

        if verified.is_empty() {
            return Err(Error::NoVerifiedMatches {
                query: query.to_string(),
            });
        }

        Ok(verified)
    }
}
