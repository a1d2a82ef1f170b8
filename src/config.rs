use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::index::Metric;
use crate::models::ChunkingParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    /// Ordered section list for full-report generation.
    #[serde(default)]
    pub sections: Vec<SectionConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
}

fn default_overlap() -> usize {
    200
}
fn default_tokenizer() -> String {
    "cl100k_base".to_string()
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams::new(self.chunk_size, self.overlap)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    pub namespace: String,
    pub dimension: usize,
    #[serde(default = "default_metric")]
    pub metric: Metric,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_metric() -> Metric {
    Metric::Cosine
}
fn default_upsert_batch_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            base_url: default_base_url(),
            batch_size: default_embed_batch_size(),
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_embed_batch_size() -> usize {
    64
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_secs() -> u64 {
    4
}
fn default_max_delay_secs() -> u64 {
    10
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_gen_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_report_title")]
    pub report_title: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            base_url: default_base_url(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            timeout_secs: default_gen_timeout_secs(),
            report_title: default_report_title(),
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}
fn default_top_k() -> usize {
    5
}
fn default_gen_timeout_secs() -> u64 {
    120
}
fn default_report_title() -> String {
    "Grounded Report".to_string()
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VerifyConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl VerifyConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// One named section of the generated report.
#[derive(Debug, Deserialize, Clone)]
pub struct SectionConfig {
    pub name: String,
    pub requirements: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("failed to parse config file: {}", e)))?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        return Err(Error::Config("chunking.chunk_size must be > 0".into()));
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        return Err(Error::Config(
            "chunking.overlap must be < chunking.chunk_size".into(),
        ));
    }
    match config.chunking.tokenizer.as_str() {
        "cl100k_base" | "whitespace" => {}
        other => {
            return Err(Error::Config(format!(
                "unknown tokenizer: '{}'. Must be cl100k_base or whitespace.",
                other
            )))
        }
    }

    // Validate index
    if config.index.dimension == 0 {
        return Err(Error::Config("index.dimension must be > 0".into()));
    }
    if config.index.upsert_batch_size == 0 {
        return Err(Error::Config("index.upsert_batch_size must be > 0".into()));
    }
    match config.index.backend.as_str() {
        "sqlite" | "memory" => {}
        other => {
            return Err(Error::Config(format!(
                "unknown index backend: '{}'. Must be sqlite or memory.",
                other
            )))
        }
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            return Err(Error::Config(format!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            )));
        }
        if config.embedding.max_attempts == 0 {
            return Err(Error::Config("embedding.max_attempts must be > 0".into()));
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => {
            return Err(Error::Config(format!(
                "unknown embedding provider: '{}'. Must be disabled or openai.",
                other
            )))
        }
    }

    // Validate generation
    if config.generation.is_enabled() && config.generation.model.is_none() {
        return Err(Error::Config(format!(
            "generation.model must be specified when provider is '{}'",
            config.generation.provider
        )));
    }
    if config.generation.top_k == 0 {
        return Err(Error::Config("generation.top_k must be > 0".into()));
    }
    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => {
            return Err(Error::Config(format!(
                "unknown generation provider: '{}'. Must be disabled or openai.",
                other
            )))
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    const MINIMAL: &str = r#"
[db]
path = "./data/gw.sqlite"

[chunking]
chunk_size = 1000
overlap = 200

[index]
namespace = "default"
dimension = 1536
"#;

    #[test]
    fn test_minimal_config_loads_with_defaults() {
        let f = write_config(MINIMAL);
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.index.metric, Metric::Cosine);
        assert_eq!(config.index.upsert_batch_size, 50);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.embedding.max_attempts, 3);
        assert_eq!(config.embedding.base_delay_secs, 4);
        assert_eq!(config.embedding.max_delay_secs, 10);
        assert_eq!(config.generation.top_k, 5);
        assert!(config.sections.is_empty());
    }

    #[test]
    fn test_overlap_must_be_less_than_chunk_size() {
        let f = write_config(
            r#"
[db]
path = "./gw.sqlite"

[chunking]
chunk_size = 100
overlap = 100

[index]
namespace = "default"
dimension = 8
"#,
        );
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_enabled_embedding_requires_model() {
        let f = write_config(
            r#"
[db]
path = "./gw.sqlite"

[chunking]
chunk_size = 100

[index]
namespace = "default"
dimension = 8

[embedding]
provider = "openai"
"#,
        );
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_sections_parse_in_order() {
        let f = write_config(&format!(
            "{}\n{}",
            MINIMAL,
            r#"
[[sections]]
name = "Overview"
requirements = "Summarize the organization."

[[sections]]
name = "Budget"
requirements = "Break down the budget."
"#
        ));
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.sections.len(), 2);
        assert_eq!(config.sections[0].name, "Overview");
        assert_eq!(config.sections[1].name, "Budget");
    }
}
