// src/classify/mod.rs
//! Market-impact classification: result types, the remote classifier seam,
//! the local fallback, and the batch orchestrator tying them together.

pub mod fallback;
pub mod orchestrator;
pub mod remote;

use serde::{Deserialize, Serialize};

use crate::ingest::types::Item;

pub use fallback::FallbackClassifier;
pub use orchestrator::{BatchOutcome, BatchSink, CollectingSink, Orchestrator, RunSummary, SinkClosed};
pub use remote::{build_classifier, parse_classifier_response, DisabledClassifier, LlmClassifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "USA", alias = "US", alias = "United States")]
    Usa,
    Europe,
    Asia,
    #[serde(rename = "Middle East")]
    MiddleEast,
    #[serde(rename = "Latin America")]
    LatinAmerica,
    Africa,
    Global,
}

impl Region {
    pub const ALL: [Region; 7] = [
        Region::Usa,
        Region::Europe,
        Region::Asia,
        Region::MiddleEast,
        Region::LatinAmerica,
        Region::Africa,
        Region::Global,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Region::Usa => "USA",
            Region::Europe => "Europe",
            Region::Asia => "Asia",
            Region::MiddleEast => "Middle East",
            Region::LatinAmerica => "Latin America",
            Region::Africa => "Africa",
            Region::Global => "Global",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentiment {
    Bullish,
    Bearish,
    Mixed,
    Neutral,
}

impl Sentiment {
    /// Contribution to aggregate scores: +1 / -1 / 0.
    pub fn polarity(self) -> i32 {
        match self {
            Sentiment::Bullish => 1,
            Sentiment::Bearish => -1,
            Sentiment::Mixed | Sentiment::Neutral => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impact {
    Bullish,
    Bearish,
    Neutral,
    Uncertain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "Short-term")]
    ShortTerm,
    #[serde(rename = "Medium-term")]
    MediumTerm,
    #[serde(rename = "Long-term")]
    LongTerm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Legacy per-commodity impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommodityImpact {
    Bullish,
    Bearish,
    Neutral,
    Mixed,
}

impl From<Sentiment> for CommodityImpact {
    fn from(s: Sentiment) -> Self {
        match s {
            Sentiment::Bullish => CommodityImpact::Bullish,
            Sentiment::Bearish => CommodityImpact::Bearish,
            Sentiment::Mixed => CommodityImpact::Mixed,
            Sentiment::Neutral => CommodityImpact::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorImpact {
    pub sector: String,
    pub impact: Impact,
    pub reasoning: String,
    #[serde(default)]
    pub tickers: Vec<String>,
    pub timeframe: Timeframe,
    pub confidence: Confidence,
}

/// Which path produced a result. Fallback results are keyword estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrigin {
    Remote,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub region: Region,
    pub summary: String,
    pub overall_sentiment: Sentiment,
    pub sectors: Vec<SectorImpact>,
    pub key_insight: String,
    pub gold: CommodityImpact,
    pub silver: CommodityImpact,
    pub rare_minerals: CommodityImpact,
    pub stock_markets: CommodityImpact,
    pub origin: ResultOrigin,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("classifier returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Malformed, partial or misaligned response.
    #[error("classifier protocol error: {0}")]
    Protocol(String),
    #[error("classifier call timed out after {0} ms")]
    Timeout(u64),
    #[error("remote classifier disabled")]
    Disabled,
}

/// Remote classification capability.
///
/// Implementations return exactly one result per input item, in input order,
/// or fail the whole batch.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, batch: &[Item]) -> Result<Vec<ClassificationResult>, ClassifierError>;
    fn name(&self) -> &'static str;
}
