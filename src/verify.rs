//! Source verification: fetch, fingerprint, and gate.
//!
//! [`Verifier::verify`] reads a source's raw bytes, computes a SHA-256
//! digest over exactly those bytes, and captures best-effort metadata
//! (content-type, last-modified, size). The returned [`VerifiedSource`]
//! is the only way content enters the chunking/embedding path.
//!
//! Verification has no side effects; callers decide whether to append
//! the record to the audit log.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::VerifyConfig;
use crate::error::{Error, Result};
use crate::models::{Locator, Source, VerificationRecord, VerifiedSource};

pub struct Verifier {
    http: reqwest::Client,
}

impl Verifier {
    pub fn new(config: &VerifyConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {}", e)))?;
        Ok(Self { http })
    }

    /// Fetch and fingerprint a source.
    ///
    /// Fails with [`Error::SourceUnavailable`] if the locator cannot be
    /// read and [`Error::SourceEmpty`] if the content length is zero.
    /// Re-verifying unchanged content yields an identical hash.
    pub async fn verify(&self, source: &Source) -> Result<VerifiedSource> {
        let fetched = match &source.locator {
            Locator::Url(url) => self.fetch_url(&source.id, url).await?,
            Locator::Path(path) => read_file(&source.id, path)?,
        };

        if fetched.bytes.is_empty() {
            return Err(Error::SourceEmpty {
                source_id: source.id.clone(),
            });
        }

        let content_hash = hex::encode(Sha256::digest(&fetched.bytes));
        debug!(source_id = %source.id, hash = %content_hash, size = fetched.bytes.len(), "verified source");

        let record = VerificationRecord {
            source_id: source.id.clone(),
            content_hash,
            captured_at: Utc::now(),
            size_bytes: fetched.bytes.len() as u64,
            content_type: fetched.content_type,
            last_modified: fetched.last_modified,
            verified: true,
        };

        let text = String::from_utf8_lossy(&fetched.bytes).into_owned();
        Ok(VerifiedSource::new(source.clone(), record, text))
    }

    async fn fetch_url(&self, source_id: &str, url: &str) -> Result<Fetched> {
        let unavailable = |reason: String| Error::SourceUnavailable {
            source_id: source_id.to_string(),
            reason,
        };

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}", status)));
        }

        let content_type = header_value(&resp, "content-type");
        let last_modified = header_value(&resp, "last-modified");

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| unavailable(e.to_string()))?
            .to_vec();

        Ok(Fetched {
            bytes,
            content_type,
            last_modified,
        })
    }
}

struct Fetched {
    bytes: Vec<u8>,
    content_type: Option<String>,
    last_modified: Option<String>,
}

fn header_value(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn read_file(source_id: &str, path: &std::path::Path) -> Result<Fetched> {
    let unavailable = |reason: String| Error::SourceUnavailable {
        source_id: source_id.to_string(),
        reason,
    };

    let bytes = std::fs::read(path)
        .map_err(|e| unavailable(format!("{}: {}", path.display(), e)))?;

    let last_modified = std::fs::metadata(path)
        .ok()
        .and_then(|m| m.modified().ok())
        .map(|mtime| DateTime::<Utc>::from(mtime).to_rfc3339());

    Ok(Fetched {
        bytes,
        content_type: None,
        last_modified,
    })
}
