// src/config/mod.rs
//! Scanner configuration, loaded from TOML with env-path override and built-in defaults.
//!
//! Batch size, retry budget and delays are tuned to upstream rate limits, not
//! semantics, so all of them live here rather than in code.

pub mod ai;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::classify::Region;
use crate::ingest::types::SearchQuery;

pub use ai::{AiConfig, ProviderKind};

pub const DEFAULT_CONFIG_PATH: &str = "config/scanner.toml";
pub const ENV_CONFIG_PATH: &str = "SCANNER_CONFIG_PATH";
pub const ENV_NEWS_API_KEY: &str = "NEWS_API_KEY";

/// Configuration problems that make a scan impossible. Surfaced as a terminal
/// `error` event before anything is fetched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalConfigError {
    #[error("missing required credential: set {0}")]
    MissingCredential(&'static str),
    #[error("unsupported classifier provider: {0}")]
    UnsupportedProvider(String),
    #[error("cannot build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub queries: Vec<SearchQuery>,
    pub ranking: RankingConfig,
    pub batch: BatchConfig,
    pub fallback: FallbackConfig,
    pub search: SearchConfig,
    pub ai: AiConfig,
    /// How many completed-run records the in-memory history keeps.
    pub history_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let q = |query: &str, page_size: u32, category: &str| SearchQuery {
            query: query.to_string(),
            page_size,
            category: category.to_string(),
        };
        Self {
            queries: vec![
                q("stock market OR wall street", 20, "us-markets"),
                q("federal reserve OR interest rates", 15, "us-economy"),
                q("semiconductors OR tech stocks", 10, "technology"),
                q("ECB OR european markets", 15, "europe"),
                q("china economy OR asian markets", 15, "asia"),
                q("middle east OR sanctions", 10, "middle-east"),
                q("oil prices OR OPEC", 10, "energy"),
                q("gold OR silver OR rare earths", 10, "commodities"),
            ],
            ranking: RankingConfig::default(),
            batch: BatchConfig::default(),
            fallback: FallbackConfig::default(),
            search: SearchConfig::default(),
            ai: AiConfig::default(),
            history_capacity: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Target item budget per scan.
    pub max_items: usize,
    /// Empty disables weighted rebalancing.
    pub groups: Vec<RankingGroup>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        let g = |name: &str, weight: f64, cats: &[&str]| RankingGroup {
            name: name.to_string(),
            weight,
            categories: cats.iter().map(|c| c.to_string()).collect(),
        };
        Self {
            max_items: 40,
            groups: vec![
                g("americas", 0.4, &["us-markets", "us-economy", "technology"]),
                g("international", 0.4, &["europe", "asia", "middle-east"]),
                g("commodities", 0.2, &["energy", "commodities"]),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingGroup {
    pub name: String,
    pub weight: f64,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Total remote attempts per batch before falling back (>= 1).
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub inter_batch_delay_ms: u64,
    pub call_timeout_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_attempts: 3,
            retry_delay_ms: 1_000,
            inter_batch_delay_ms: 500,
            call_timeout_ms: 30_000,
        }
    }
}

impl BatchConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub default_region: Region,
    /// Category → region used when the remote classifier is unavailable.
    pub region_by_category: BTreeMap<String, Region>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        let region_by_category = [
            ("us-markets", Region::Usa),
            ("us-economy", Region::Usa),
            ("technology", Region::Usa),
            ("europe", Region::Europe),
            ("asia", Region::Asia),
            ("middle-east", Region::MiddleEast),
        ]
        .into_iter()
        .map(|(c, r)| (c.to_string(), r))
        .collect();
        Self {
            default_region: Region::Global,
            region_by_category,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    /// "ENV" means: read from NEWS_API_KEY
    pub api_key: String,
    pub language: String,
    pub timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org".to_string(),
            api_key: "ENV".to_string(),
            language: "en".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl SearchConfig {
    pub fn resolve_api_key(&self) -> Result<String, FatalConfigError> {
        resolve_secret(&self.api_key, ENV_NEWS_API_KEY)
    }
}

/// `"ENV"` (any case) reads `env_name`; anything else is taken literally. Empty is missing.
pub(crate) fn resolve_secret(value: &str, env_name: &'static str) -> Result<String, FatalConfigError> {
    let v = value.trim();
    let resolved = if v.eq_ignore_ascii_case("env") {
        std::env::var(env_name).unwrap_or_default()
    } else {
        v.to_string()
    };
    if resolved.trim().is_empty() {
        return Err(FatalConfigError::MissingCredential(env_name));
    }
    Ok(resolved)
}

impl ScanConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading scanner config from {}", path.display()))?;
        let cfg: ScanConfig = toml::from_str(&data)
            .with_context(|| format!("parsing scanner config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $SCANNER_CONFIG_PATH (must exist)
    /// 2) config/scanner.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from_file(&pb);
        }
        let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Self::load_from_file(&default_path);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.queries.is_empty() {
            bail!("at least one query is required");
        }
        if self.ranking.max_items == 0 {
            bail!("ranking.max_items must be >= 1");
        }
        if self.batch.batch_size == 0 {
            bail!("batch.batch_size must be >= 1");
        }
        if self.batch.max_attempts == 0 {
            bail!("batch.max_attempts must be >= 1");
        }
        if self.batch.call_timeout_ms == 0 {
            bail!("batch.call_timeout_ms must be >= 1");
        }
        for g in &self.ranking.groups {
            if !g.weight.is_finite() || g.weight < 0.0 {
                bail!("ranking group '{}' has invalid weight {}", g.name, g.weight);
            }
        }
        Ok(())
    }
}
