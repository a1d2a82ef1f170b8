//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow from verified source to indexed vectors:
//! chunking → batched embedding → batched upsert, with provenance
//! metadata attached to every record. Only a [`VerifiedSource`] can
//! enter; there is no path for unverified content.
//!
//! Batch runs collect per-source outcomes — a failed source never
//! aborts its siblings, and nothing is dropped silently.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::VerificationLog;
use crate::chunk::chunk_text;
use crate::embedding::{embed_with_retry, Embedder};
use crate::error::{Error, Result};
use crate::index::{Metric, VectorIndex};
use crate::models::{ChunkMetadata, ChunkingParams, IndexedRecord, Source, VerifiedSource};
use crate::retry::RetryPolicy;
use crate::tokenize::Tokenizer;
use crate::verify::Verifier;

/// Everything one ingestion run needs, injected explicitly so tests can
/// substitute any service.
pub struct Pipeline {
    tokenizer: Arc<dyn Tokenizer>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    retry: RetryPolicy,
    chunking: ChunkingParams,
    namespace: String,
    dimension: usize,
    metric: Metric,
    embed_batch_size: usize,
    upsert_batch_size: usize,
}

/// Per-source result of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source_id: String,
    pub chunks: usize,
    pub records_upserted: usize,
    pub batches_applied: usize,
}

/// Per-source outcome within a batch run.
#[derive(Debug)]
pub struct IngestOutcome {
    pub source_id: String,
    pub result: Result<IngestReport>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        retry: RetryPolicy,
        chunking: ChunkingParams,
        namespace: impl Into<String>,
        dimension: usize,
        metric: Metric,
        embed_batch_size: usize,
        upsert_batch_size: usize,
    ) -> Result<Self> {
        let namespace = namespace.into();
        if embedder.dims() != dimension {
            return Err(Error::DimensionMismatch {
                namespace,
                expected: dimension,
                actual: embedder.dims(),
            });
        }
        Ok(Self {
            tokenizer,
            embedder,
            index,
            retry,
            chunking,
            namespace,
            dimension,
            metric,
            embed_batch_size: embed_batch_size.max(1),
            upsert_batch_size: upsert_batch_size.max(1),
        })
    }

    /// Chunk, embed, and upsert one verified source under a section tag.
    pub async fn ingest(
        &self,
        verified: &VerifiedSource,
        section: &str,
        extra: BTreeMap<String, String>,
    ) -> Result<IngestReport> {
        let source_id = verified.source().id.clone();
        let chunks = chunk_text(
            self.tokenizer.as_ref(),
            &source_id,
            verified.text(),
            self.chunking,
        )?;

        if chunks.is_empty() {
            return Ok(IngestReport {
                source_id,
                chunks: 0,
                records_upserted: 0,
                batches_applied: 0,
            });
        }

        self.index
            .ensure_namespace(&self.namespace, self.dimension, self.metric)
            .await?;

        let record = verified.record();
        let mut records = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embed_with_retry(self.embedder.as_ref(), &self.retry, &texts).await?;

            for (chunk, embedding) in batch.iter().zip(vectors) {
                records.push(IndexedRecord {
                    id: IndexedRecord::vector_id(&source_id, chunk.index),
                    embedding,
                    metadata: ChunkMetadata {
                        text: chunk.text.clone(),
                        chunk_index: chunk.index,
                        source_id: source_id.clone(),
                        section: section.to_string(),
                        captured_at: record.captured_at,
                        verification: record.clone(),
                        verified: record.verified,
                        extra: extra.clone(),
                    },
                });
            }
        }

        let chunk_count = chunks.len();
        let report = self
            .index
            .upsert(&self.namespace, records, self.upsert_batch_size)
            .await?;

        info!(
            source_id = %source_id,
            chunks = chunk_count,
            records = report.records_applied,
            batches = report.batches_applied,
            "ingested source"
        );

        Ok(IngestReport {
            source_id,
            chunks: chunk_count,
            records_upserted: report.records_applied,
            batches_applied: report.batches_applied,
        })
    }
}

/// Verify, log, and ingest each source independently.
///
/// A source that fails at any stage is recorded in its outcome and the
/// run moves on; a failed verification appends nothing to the audit
/// log and writes no vectors.
pub async fn ingest_all(
    pipeline: &Pipeline,
    verifier: &Verifier,
    log: &VerificationLog,
    items: &[(Source, String)],
) -> Vec<IngestOutcome> {
    let mut outcomes = Vec::with_capacity(items.len());

    for (source, section) in items {
        let result = ingest_one(pipeline, verifier, log, source, section).await;
        if let Err(e) = &result {
            warn!(source_id = %source.id, error = %e, "source ingestion failed");
        }
        outcomes.push(IngestOutcome {
            source_id: source.id.clone(),
            result,
        });
    }

    outcomes
}

async fn ingest_one(
    pipeline: &Pipeline,
    verifier: &Verifier,
    log: &VerificationLog,
    source: &Source,
    section: &str,
) -> Result<IngestReport> {
    let verified = verifier.verify(source).await?;
    log.append(verified.record()).await?;
    pipeline.ingest(&verified, section, BTreeMap::new()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::Write;

    use crate::config::VerifyConfig;
    use crate::db;
    use crate::embedding::EmbedError;
    use crate::index::memory::MemoryIndex;
    use crate::migrate;
    use crate::models::{Locator, SourceKind};
    use crate::tokenize::WhitespaceTokenizer;

    /// Counts words into a fixed number of buckets.
    struct BagEmbedder {
        dims: usize,
    }

    #[async_trait]
    impl Embedder for BagEmbedder {
        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; self.dims];
                    for word in t.split_whitespace() {
                        let bucket =
                            word.bytes().map(|b| b as usize).sum::<usize>() % self.dims;
                        v[bucket] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn pipeline(index: Arc<MemoryIndex>) -> Pipeline {
        Pipeline::new(
            Arc::new(WhitespaceTokenizer::new()),
            Arc::new(BagEmbedder { dims: 8 }),
            index,
            RetryPolicy::default(),
            ChunkingParams::new(10, 2),
            "ns",
            8,
            Metric::Cosine,
            4,
            3,
        )
        .unwrap()
    }

    fn sentence(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn verified(text: &str) -> (tempfile::NamedTempFile, VerifiedSource) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(text.as_bytes()).unwrap();
        let source = Source {
            id: "doc".into(),
            kind: SourceKind::File,
            locator: Locator::Path(f.path().to_path_buf()),
        };
        let v = Verifier::new(&VerifyConfig::default()).unwrap();
        let verified = v.verify(&source).await.unwrap();
        (f, verified)
    }

    #[tokio::test]
    async fn test_ingest_upserts_one_record_per_chunk() {
        let index = Arc::new(MemoryIndex::new());
        let p = pipeline(index.clone());
        let (_f, vs) = verified(&sentence(25)).await;

        let report = p.ingest(&vs, "general", BTreeMap::new()).await.unwrap();
        // 25 tokens, chunk_size=10, overlap=2 -> starts 0,8,16,24.
        assert_eq!(report.chunks, 4);
        assert_eq!(report.records_upserted, 4);
        assert_eq!(report.batches_applied, 2);

        let matches = index
            .query("ns", &[1.0; 8], 10, None)
            .await
            .unwrap();
        assert_eq!(matches.len(), 4);
        let ids: Vec<&str> = matches.iter().map(|m| m.record.id.as_str()).collect();
        assert!(ids.contains(&"doc:0") && ids.contains(&"doc:3"));
        for m in &matches {
            assert!(m.record.metadata.verified);
            assert_eq!(m.record.metadata.section, "general");
            assert_eq!(
                m.record.metadata.verification.content_hash.len(),
                64,
                "metadata must carry the full verification record"
            );
        }
    }

    #[tokio::test]
    async fn test_dimension_mismatch_caught_at_construction() {
        let err = Pipeline::new(
            Arc::new(WhitespaceTokenizer::new()),
            Arc::new(BagEmbedder { dims: 8 }),
            Arc::new(MemoryIndex::new()),
            RetryPolicy::default(),
            ChunkingParams::new(10, 2),
            "ns",
            16,
            Metric::Cosine,
            4,
            3,
        )
        .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_failed_verification_leaves_no_trace() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::connect(&tmp.path().join("gw.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        let log = VerificationLog::new(pool);

        let index = Arc::new(MemoryIndex::new());
        let p = pipeline(index.clone());
        let verifier = Verifier::new(&VerifyConfig::default()).unwrap();

        let good_file = {
            let mut f = tempfile::NamedTempFile::new().unwrap();
            f.write_all(sentence(12).as_bytes()).unwrap();
            f
        };
        let items = vec![
            (
                Source {
                    id: "good".into(),
                    kind: SourceKind::File,
                    locator: Locator::Path(good_file.path().to_path_buf()),
                },
                "general".to_string(),
            ),
            (
                Source {
                    id: "bad".into(),
                    kind: SourceKind::File,
                    locator: Locator::Path("/nonexistent/missing.txt".into()),
                },
                "general".to_string(),
            ),
        ];

        let outcomes = ingest_all(&p, &verifier, &log, &items).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(
            outcomes[1].result,
            Err(Error::SourceUnavailable { .. })
        ));

        // The failed source produced no log entries and no vectors.
        assert!(log.for_source("bad").await.unwrap().is_empty());
        assert_eq!(log.for_source("good").await.unwrap().len(), 1);
        let matches = index.query("ns", &[1.0; 8], 20, None).await.unwrap();
        assert!(matches.iter().all(|m| m.record.metadata.source_id == "good"));
    }

    #[tokio::test]
    async fn test_empty_text_never_reaches_the_index() {
        // Whitespace-only content hashes fine but tokenizes to nothing.
        let index = Arc::new(MemoryIndex::new());
        let p = pipeline(index.clone());
        let (_f, vs) = verified("   \n\t  ").await;

        let report = p.ingest(&vs, "general", BTreeMap::new()).await.unwrap();
        assert_eq!(report.chunks, 0);
        assert_eq!(report.records_upserted, 0);
    }
}
