//! # Groundwire CLI (`gw`)
//!
//! The `gw` binary is the presentation layer for the Groundwire
//! pipeline. It owns no pipeline state: every command constructs the
//! configured service handles (tokenizer, embedder, index, generator)
//! and calls into the library.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gw init` | Create the SQLite database and run schema migrations |
//! | `gw add <id>` | Register a source (website URL or file path) |
//! | `gw sources` | List registered sources and verification status |
//! | `gw verify <id>` | Fetch, fingerprint, and log a source |
//! | `gw ingest <id>` | Verify then chunk, embed, and index a source |
//! | `gw query "<text>"` | Retrieve verified chunks for a query |
//! | `gw generate` | Generate the full grounded report |
//! | `gw log [id]` | Show the append-only verification log |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! gw init --config ./config/groundwire.toml
//!
//! # Register and ingest an official website
//! gw add org_website --kind website --url https://example.org
//! gw ingest org_website --section organization_overview
//!
//! # Retrieve verified context
//! gw query "annual budget" --top-k 5
//!
//! # Generate the report defined by [[sections]] in the config
//! gw generate --out report.md
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use groundwire::audit::VerificationLog;
use groundwire::config::{load_config, Config};
use groundwire::embedding::{create_embedder, retry_policy};
use groundwire::generate::{create_generator, SectionSpec, SectionStatus, SectionWriter};
use groundwire::index::memory::MemoryIndex;
use groundwire::index::sqlite::SqliteIndex;
use groundwire::index::{MetadataFilter, VectorIndex};
use groundwire::ingest::Pipeline;
use groundwire::models::{Locator, Source, SourceKind};
use groundwire::retrieve::Retriever;
use groundwire::sources::SourceRegistry;
use groundwire::tokenize::create_tokenizer;
use groundwire::verify::Verifier;
use groundwire::{db, migrate};

/// Groundwire — a provenance-verified context ingestion and grounded
/// generation pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file. See `config/groundwire.example.toml` for a full
/// example.
#[derive(Parser)]
#[command(
    name = "gw",
    about = "Groundwire — provenance-verified ingestion and grounded generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/groundwire.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (sources, verification_log, namespaces, vectors). Idempotent.
    Init,

    /// Register a data source.
    ///
    /// Websites take a URL; files and reports take a path. The raw
    /// content is not fetched until `verify` or `ingest`.
    Add {
        /// Source id, unique in the registry (e.g. `org_website`).
        id: String,

        /// Source kind: `website`, `file`, or `report`.
        #[arg(long)]
        kind: SourceKind,

        /// URL for website sources.
        #[arg(long)]
        url: Option<String>,

        /// Path for file/report sources.
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// List registered sources with their verification status.
    Sources,

    /// Fetch a source, fingerprint it, and append to the audit log.
    Verify {
        /// Source id to verify.
        id: String,
    },

    /// Verify a source, then chunk, embed, and index its content.
    Ingest {
        /// Source id to ingest.
        id: String,

        /// Section/category tag stored with each chunk.
        #[arg(long, default_value = "general")]
        section: String,
    },

    /// Retrieve verified chunks for a query.
    Query {
        /// The query text.
        query: String,

        /// Maximum number of matches.
        #[arg(long, default_value_t = 5)]
        top_k: usize,

        /// Restrict to chunks ingested under this section tag.
        #[arg(long)]
        section: Option<String>,
    },

    /// Generate the full grounded report over the configured sections.
    Generate {
        /// Write the rendered Markdown here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show the verification log, optionally for one source.
    Log {
        /// Source id to filter by.
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Add {
            id,
            kind,
            url,
            path,
        } => run_add(&config, id, kind, url, path).await,
        Commands::Sources => run_sources(&config).await,
        Commands::Verify { id } => run_verify(&config, &id).await,
        Commands::Ingest { id, section } => run_ingest(&config, &id, &section).await,
        Commands::Query {
            query,
            top_k,
            section,
        } => run_query(&config, &query, top_k, section).await,
        Commands::Generate { out } => run_generate(&config, out).await,
        Commands::Log { id } => run_log(&config, id).await,
    }
}

async fn run_init(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    println!("initialized {}", config.db.path.display());
    Ok(())
}

async fn run_add(
    config: &Config,
    id: String,
    kind: SourceKind,
    url: Option<String>,
    path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let locator = match (url, path) {
        (Some(u), None) => Locator::Url(u),
        (None, Some(p)) => Locator::Path(p),
        _ => bail!("provide exactly one of --url or --path"),
    };
    if kind == SourceKind::Website && !matches!(locator, Locator::Url(_)) {
        bail!("website sources require --url");
    }

    let pool = db::connect(&config.db.path).await?;
    let registry = SourceRegistry::new(pool);
    let source = Source { id, kind, locator };

    if registry.add(&source).await? {
        println!("added {} ({}) {}", source.id, source.kind, source.locator);
    } else {
        println!("source {} already registered", source.id);
    }
    Ok(())
}

async fn run_sources(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let registry = SourceRegistry::new(pool);
    let statuses = registry.list().await?;

    if statuses.is_empty() {
        println!("No sources registered.");
        return Ok(());
    }

    println!(
        "{:<20} {:<10} {:<10} {:<6} LOCATOR",
        "ID", "KIND", "VERIFIED", "RUNS"
    );
    for status in statuses {
        println!(
            "{:<20} {:<10} {:<10} {:<6} {}",
            status.source.id,
            status.source.kind.to_string(),
            if status.verified { "yes" } else { "no" },
            status.verification_count,
            status.source.locator
        );
    }
    Ok(())
}

async fn run_verify(config: &Config, id: &str) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let registry = SourceRegistry::new(pool.clone());
    let log = VerificationLog::new(pool);
    let source = registry.get(id).await?;

    let verifier = Verifier::new(&config.verify)?;
    let verified = verifier.verify(&source).await?;
    log.append(verified.record()).await?;

    let record = verified.record();
    println!("verified {}", id);
    println!("  hash: {}", record.content_hash);
    println!("  size: {} bytes", record.size_bytes);
    println!("  captured: {}", record.captured_at.to_rfc3339());
    if let Some(ct) = &record.content_type {
        println!("  content-type: {}", ct);
    }
    if let Some(lm) = &record.last_modified {
        println!("  last-modified: {}", lm);
    }
    Ok(())
}

async fn run_ingest(config: &Config, id: &str, section: &str) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let registry = SourceRegistry::new(pool.clone());
    let log = VerificationLog::new(pool.clone());
    let source = registry.get(id).await?;

    let verifier = Verifier::new(&config.verify)?;
    let verified = verifier.verify(&source).await?;
    log.append(verified.record()).await?;

    let pipeline = build_pipeline(config, pool)?;
    let report = pipeline
        .ingest(&verified, section, BTreeMap::new())
        .await?;

    println!("ingest {}", id);
    println!("  chunks: {}", report.chunks);
    println!("  records upserted: {}", report.records_upserted);
    println!("  batches applied: {}", report.batches_applied);
    println!("ok");
    Ok(())
}

async fn run_query(
    config: &Config,
    query: &str,
    top_k: usize,
    section: Option<String>,
) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let retriever = build_retriever(config, pool)?;

    let filter = section.map(|s| MetadataFilter {
        section: Some(s),
        source_id: None,
    });
    let matches = match retriever
        .retrieve_filtered(query, top_k, filter.as_ref())
        .await
    {
        Ok(matches) => matches,
        Err(groundwire::Error::NoVerifiedMatches { .. }) => {
            println!("No verified matches.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for m in matches {
        let snippet: String = m.record.metadata.text.chars().take(100).collect();
        println!(
            "{:.4}  {:<24} [{}] {}",
            m.score, m.record.id, m.record.metadata.section, snippet
        );
    }
    Ok(())
}

async fn run_generate(config: &Config, out: Option<PathBuf>) -> anyhow::Result<()> {
    if config.sections.is_empty() {
        bail!("no [[sections]] configured; add them to the config file");
    }

    let pool = db::connect(&config.db.path).await?;
    let retriever = build_retriever(config, pool)?;
    let generator = create_generator(&config.generation)?;
    let writer = SectionWriter::new(retriever, generator, config.generation.top_k);

    let sections: Vec<SectionSpec> = config
        .sections
        .iter()
        .map(|s| SectionSpec {
            name: s.name.clone(),
            requirements: s.requirements.clone(),
        })
        .collect();

    let report = writer
        .generate_report(&config.generation.report_title, &sections)
        .await;

    println!("generate run {}", report.run_id);
    for section in &report.sections {
        let marker = match section.status {
            SectionStatus::Ok => "ok",
            SectionStatus::MissingInformation => "MISSING INFORMATION",
            SectionStatus::Failed => "FAILED",
        };
        println!("  {}: {}", section.name, marker);
    }

    let markdown = report.to_markdown();
    match out {
        Some(path) => {
            std::fs::write(&path, markdown)?;
            println!("report written to {}", path.display());
        }
        None => println!("\n{}", markdown),
    }

    let incomplete = report.incomplete();
    if !incomplete.is_empty() {
        println!(
            "WARNING: {} section(s) incomplete; see the Generation Summary.",
            incomplete.len()
        );
    }
    Ok(())
}

async fn run_log(config: &Config, id: Option<String>) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let log = VerificationLog::new(pool);

    let entries = match id {
        Some(id) => log.for_source(&id).await?,
        None => log.list().await?,
    };

    if entries.is_empty() {
        println!("No log entries.");
        return Ok(());
    }

    println!("{:<20} {:<26} {:<12} HASH", "SOURCE", "LOGGED", "SIZE");
    for entry in entries {
        println!(
            "{:<20} {:<26} {:<12} {}",
            entry.source_id,
            entry.logged_at.to_rfc3339(),
            entry.record.size_bytes,
            entry.record.content_hash
        );
    }
    Ok(())
}

fn build_index(config: &Config, pool: sqlx::SqlitePool) -> Arc<dyn VectorIndex> {
    match config.index.backend.as_str() {
        "memory" => Arc::new(MemoryIndex::new()),
        _ => Arc::new(SqliteIndex::new(pool)),
    }
}

fn build_retriever(config: &Config, pool: sqlx::SqlitePool) -> anyhow::Result<Retriever> {
    let embedder = create_embedder(&config.embedding, config.index.dimension)?;
    let index = build_index(config, pool);
    Ok(Retriever::new(
        Arc::from(embedder),
        index,
        retry_policy(&config.embedding),
        config.index.namespace.clone(),
    ))
}

fn build_pipeline(config: &Config, pool: sqlx::SqlitePool) -> anyhow::Result<Pipeline> {
    let tokenizer = create_tokenizer(&config.chunking.tokenizer)?;
    let embedder = create_embedder(&config.embedding, config.index.dimension)?;
    let index = build_index(config, pool);

    Ok(Pipeline::new(
        Arc::from(tokenizer),
        Arc::from(embedder),
        index,
        retry_policy(&config.embedding),
        config.chunking.params(),
        config.index.namespace.clone(),
        config.index.dimension,
        config.index.metric,
        config.embedding.batch_size,
        config.index.upsert_batch_size,
    )?)
}
