//! Grounded section generation and report assembly.
//!
//! Each section retrieves verified context for its requirements,
//! assembles a grounding prompt that embeds that context verbatim and
//! forbids fabrication, and makes a single generation call. Sections
//! with no verified context become explicit `MissingInformation`
//! results instead of failing the run, and the rendered report always
//! ends with a summary of incomplete sections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::retrieve::Retriever;

/// Text-generation backend boundary.
#[async_trait]
pub trait Generator: Send + Sync {
    /// One completion call. No internal retry; transient failures
    /// surface as [`Error::GenerationFailed`].
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Generation client for an OpenAI-compatible `/v1/chat/completions`
/// endpoint.
pub struct RemoteGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl RemoteGenerator {
    /// Create a client from configuration, reading the API key from the
    /// `OPENAI_API_KEY` environment variable.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY environment variable not set".into()))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Config("generation.model required".into()))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Generator for RemoteGenerator {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": self.temperature,
        });

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::GenerationFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(Error::GenerationFailed(format!(
                "{}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::GenerationFailed(e.to_string()))?;

        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::GenerationFailed("missing message content".into()))
    }
}

/// Construct the generator named in the config, or fail if disabled.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(RemoteGenerator::new(config)?)),
        "disabled" => Err(Error::Config(
            "generation provider is disabled; set [generation] provider in config".into(),
        )),
        other => Err(Error::Config(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

/// One named section and the requirements used as its retrieval query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    pub requirements: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Ok,
    MissingInformation,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionResult {
    pub name: String,
    pub status: SectionStatus,
    pub content: String,
}

/// All section results for one generation run, in section order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Unique id for this generation run.
    pub run_id: String,
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<SectionResult>,
}

impl Report {
    /// Sections that could not be generated from verified context.
    pub fn incomplete(&self) -> Vec<&SectionResult> {
        self.sections
            .iter()
            .filter(|s| s.status != SectionStatus::Ok)
            .collect()
    }

    /// Render the combined report. The closing summary enumerating
    /// incomplete sections is part of the output, not optional logging.
    pub fn to_markdown(&self) -> String {
        let mut md = format!("# {}\n\n", self.title);
        md.push_str("## Provenance Note\n\n");
        md.push_str(
            "This report was generated using only verified information sources. \
             Any missing information is clearly marked and must be provided before use.\n\n",
        );

        for section in &self.sections {
            md.push_str(&format!("## {}\n\n{}\n\n", section.name, section.content));
        }

        md.push_str("## Generation Summary\n\n");
        let incomplete = self.incomplete();
        if incomplete.is_empty() {
            md.push_str("All sections were generated from verified context.\n");
        } else {
            for section in incomplete {
                let label = match section.status {
                    SectionStatus::MissingInformation => "missing information",
                    SectionStatus::Failed => "generation failed",
                    SectionStatus::Ok => unreachable!(),
                };
                md.push_str(&format!("- {}: {}\n", section.name, label));
            }
        }
        md
    }
}

/// Build the grounding instruction pair for one section.
///
/// States the section name and requirements, embeds the verified
/// context verbatim, and forbids fabricating or inferring beyond it.
fn grounding_prompt(name: &str, requirements: &str, context: &str) -> (String, String) {
    let system = "You are an expert report writer. Use only information from verified \
                  sources. Never make up or infer information."
        .to_string();
    let user = format!(
        "Based on the following verified information and requirements, write a detailed \
         section for the report.\n\n\
         Section: {}\n\
         Requirements: {}\n\n\
         Context (from verified sources):\n{}\n\n\
         Important: Only use information from the provided context. Do not make up or \
         infer any information. If information is missing, clearly state what \
         information is needed.",
        name, requirements, context
    );
    (system, user)
}

pub struct SectionWriter {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl SectionWriter {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>, top_k: usize) -> Self {
        Self {
            retriever,
            generator,
            top_k,
        }
    }

    /// Generate one section from verified context.
    ///
    /// `NoVerifiedMatches` is recovered into a `MissingInformation`
    /// result; generation-backend failures propagate as
    /// [`Error::GenerationFailed`].
    pub async fn generate_section(&self, spec: &SectionSpec) -> Result<SectionResult> {
        let matches = match self.retriever.retrieve(&spec.requirements, self.top_k).await {
            Ok(matches) => matches,
            Err(Error::NoVerifiedMatches { .. }) => {
                warn!(section = %spec.name, "no verified context; marking section as missing information");
                return Ok(SectionResult {
                    name: spec.name.clone(),
                    status: SectionStatus::MissingInformation,
                    content: format!(
                        "No verified source material matched this section's requirements. \
                         Ingest a verified source covering: {}",
                        spec.requirements
                    ),
                });
            }
            Err(e) => return Err(e),
        };

        let context = matches
            .iter()
            .map(|m| m.record.metadata.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let (system, user) = grounding_prompt(&spec.name, &spec.requirements, &context);
        let content = self.generator.complete(&system, &user).await?;

        Ok(SectionResult {
            name: spec.name.clone(),
            status: SectionStatus::Ok,
            content,
        })
    }

    /// Generate every section in order, collecting per-section outcomes.
    ///
    /// A failed section is recorded as `Failed` and the run continues;
    /// the report always contains one entry per requested section.
    pub async fn generate_report(&self, title: &str, sections: &[SectionSpec]) -> Report {
        let mut results = Vec::with_capacity(sections.len());

        for spec in sections {
            info!(section = %spec.name, "generating section");
            match self.generate_section(spec).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(section = %spec.name, error = %e, "section generation failed");
                    results.push(SectionResult {
                        name: spec.name.clone(),
                        status: SectionStatus::Failed,
                        content: format!("ERROR: {}", e),
                    });
                }
            }
        }

        Report {
            run_id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            generated_at: Utc::now(),
            sections: results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use crate::embedding::EmbedError;
    use crate::embedding::Embedder;
    use crate::index::memory::MemoryIndex;
    use crate::index::{Metric, VectorIndex};
    use crate::models::{ChunkMetadata, IndexedRecord, VerificationRecord};
    use crate::retry::RetryPolicy;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("budget") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    /// Scripted generator that records the prompts it receives.
    struct EchoGenerator {
        prompts: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl EchoGenerator {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn complete(&self, system: &str, user: &str) -> Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            if self.fail {
                return Err(Error::GenerationFailed("backend timeout".into()));
            }
            Ok("generated section text".to_string())
        }
    }

    fn record(id: &str, embedding: Vec<f32>, text: &str) -> IndexedRecord {
        let verification = VerificationRecord {
            source_id: "src".into(),
            content_hash: "abc".into(),
            captured_at: Utc::now(),
            size_bytes: 1,
            content_type: None,
            last_modified: None,
            verified: true,
        };
        IndexedRecord {
            id: id.to_string(),
            embedding,
            metadata: ChunkMetadata {
                text: text.to_string(),
                chunk_index: 0,
                source_id: "src".into(),
                section: "general".into(),
                captured_at: Utc::now(),
                verification,
                verified: true,
                extra: BTreeMap::new(),
            },
        }
    }

    async fn writer_with(
        records: Vec<IndexedRecord>,
        generator: Arc<dyn Generator>,
    ) -> SectionWriter {
        let index = Arc::new(MemoryIndex::new());
        index.ensure_namespace("ns", 2, Metric::Cosine).await.unwrap();
        if !records.is_empty() {
            index.upsert("ns", records, 50).await.unwrap();
        }
        let retriever = Retriever::new(
            Arc::new(UnitEmbedder),
            index,
            RetryPolicy::default(),
            "ns",
        );
        SectionWriter::new(retriever, generator, 5)
    }

    fn spec(name: &str, requirements: &str) -> SectionSpec {
        SectionSpec {
            name: name.into(),
            requirements: requirements.into(),
        }
    }

    #[tokio::test]
    async fn test_empty_namespace_yields_missing_information() {
        let writer = writer_with(vec![], Arc::new(EchoGenerator::new())).await;
        let result = writer
            .generate_section(&spec("Budget", "budget breakdown"))
            .await
            .unwrap();
        assert_eq!(result.status, SectionStatus::MissingInformation);
        assert!(result.content.contains("budget breakdown"));
    }

    #[tokio::test]
    async fn test_prompt_embeds_context_and_forbids_fabrication() {
        let generator = Arc::new(EchoGenerator::new());
        let writer = writer_with(
            vec![record("src:0", vec![1.0, 0.0], "the annual budget is 50000")],
            generator.clone(),
        )
        .await;

        let result = writer
            .generate_section(&spec("Budget", "budget breakdown"))
            .await
            .unwrap();
        assert_eq!(result.status, SectionStatus::Ok);
        assert_eq!(result.content, "generated section text");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        let (system, user) = &prompts[0];
        assert!(system.contains("Never make up or infer information"));
        assert!(user.contains("Section: Budget"));
        assert!(user.contains("the annual budget is 50000"));
        assert!(user.contains("Do not make up or infer any information"));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates_from_section() {
        let writer = writer_with(
            vec![record("src:0", vec![1.0, 0.0], "budget facts")],
            Arc::new(EchoGenerator::failing()),
        )
        .await;
        let err = writer
            .generate_section(&spec("Budget", "budget breakdown"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_report_collects_all_sections_and_summarizes() {
        // Three sections. The timeline direction of the space holds only
        // unverified vectors, so that section must come back as missing
        // information while the other two generate normally.
        let mut records = vec![record("budget:0", vec![1.0, 0.0], "budget facts")];
        for i in 0..5 {
            let mut r = record(&format!("rumor:{}", i), vec![0.0, 1.0], "unverified claim");
            r.metadata.verified = false;
            r.metadata.verification.verified = false;
            records.push(r);
        }
        let writer = writer_with(records, Arc::new(EchoGenerator::new())).await;

        let sections = vec![
            spec("Budget", "budget breakdown"),
            spec("Overview", "budget and overview of the organization"),
            spec("Timeline", "milestones and timeline"),
        ];
        let report = writer.generate_report("Test Report", &sections).await;

        assert_eq!(report.sections.len(), 3);
        let statuses: Vec<SectionStatus> = report.sections.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                SectionStatus::Ok,
                SectionStatus::Ok,
                SectionStatus::MissingInformation
            ]
        );
        assert_eq!(report.incomplete().len(), 1);

        let md = report.to_markdown();
        assert!(md.contains("# Test Report"));
        let summary_pos = md.find("## Generation Summary").unwrap();
        assert!(md.find("- Timeline: missing information").unwrap() > summary_pos);
    }

    #[tokio::test]
    async fn test_report_marks_failed_sections_and_continues() {
        let writer = writer_with(
            vec![record("a:0", vec![1.0, 0.0], "budget facts")],
            Arc::new(EchoGenerator::failing()),
        )
        .await;

        let sections = vec![spec("Budget", "budget breakdown")];
        let report = writer.generate_report("Test Report", &sections).await;
        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].status, SectionStatus::Failed);
        assert!(report.sections[0].content.starts_with("ERROR:"));

        let md = report.to_markdown();
        assert!(md.contains("- Budget: generation failed"));
    }

    #[test]
    fn test_markdown_summary_lists_missing_sections() {
        let report = Report {
            run_id: "run-1".into(),
            title: "R".into(),
            generated_at: Utc::now(),
            sections: vec![
                SectionResult {
                    name: "A".into(),
                    status: SectionStatus::Ok,
                    content: "fine".into(),
                },
                SectionResult {
                    name: "B".into(),
                    status: SectionStatus::MissingInformation,
                    content: "placeholder".into(),
                },
            ],
        };
        let md = report.to_markdown();
        let summary_pos = md.find("## Generation Summary").unwrap();
        let missing_pos = md.find("- B: missing information").unwrap();
        assert!(missing_pos > summary_pos);
        assert_eq!(report.incomplete().len(), 1);
    }
}
