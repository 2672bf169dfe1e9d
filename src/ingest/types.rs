// src/ingest/types.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identity of an article for the duration of one scan: the canonical origin URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleKey(String);

impl ArticleKey {
    /// Canonicalize a URL: trim, drop the fragment, drop a trailing slash.
    pub fn from_url(raw: &str) -> Option<Self> {
        let mut url = raw.trim();
        if let Some(pos) = url.find('#') {
            url = &url[..pos];
        }
        let url = url.trim_end_matches('/');
        if url.is_empty() {
            None
        } else {
            Some(Self(url.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short anonymized id for logs (first 6 bytes of SHA-256, hex).
    pub fn short_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(self.0.as_bytes());
        let mut out = String::with_capacity(12);
        for b in digest.iter().take(6) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

impl fmt::Display for ArticleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One news headline plus provenance. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub url: ArticleKey,
    pub title: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub category: String,
    #[serde(default)]
    pub description: String,
}

impl Item {
    pub fn key(&self) -> &ArticleKey {
        &self.url
    }
}

/// One upstream query: what to search for, how many results, which category to tag them with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub category: String,
}

fn default_page_size() -> u32 {
    20
}

/// Per-query failure. Never aborts a scan; the query just contributes nothing.
#[derive(Debug, thiserror::Error)]
pub enum SourceFetchError {
    #[error("search transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("search returned status {status}")]
    Status { status: u16 },
    #[error("search timed out after {0} ms")]
    Timeout(u64),
    #[error("search response malformed: {0}")]
    Malformed(String),
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query. Items come back tagged with `query.category`.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Item>, SourceFetchError>;
    fn name(&self) -> &'static str;
}
