//! Deterministic keyword classifier used when the remote classifier is exhausted.
//!
//! Cues are case-insensitive regex fragments anchored at a word start. Stems
//! ("surge", "manufactur") match any continuation; short words spell out their
//! inflections and end at a word boundary, so "war" hits "wars" but not
//! "Warren" or "software".

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    ClassificationResult, CommodityImpact, Confidence, Impact, Region, ResultOrigin,
    SectorImpact, Sentiment, Timeframe,
};
use crate::config::FallbackConfig;
use crate::ingest::types::Item;

const BULLISH_CUES: &[&str] = &[
    "surge", "soar", r"rall(?:y|ies|ied|ying)\b", "gain", "jump", "climb", "boost",
    r"beat(?:s|ing)?\b", "record high", "upgrade", "rebound", "recover", "growth", "optimis",
    "expand", "profit", "strong", "outperform", "breakthrough", "approv", r"deals?\b",
];

const BEARISH_CUES: &[&str] = &[
    r"fall(?:s|en|ing)?\b", r"fell\b", r"drop(?:s|ped|ping)?\b", "plung", "crash", "declin",
    "slump", "tumbl", r"sink(?:s|ing)?\b", r"slid(?:e|es|ing)?\b", r"loss(?:es)?\b",
    "downgrade", "recession", "layoff", "default", "bankrupt", r"wars?\b", "sanction", "tariff",
    "crisis", r"fears?\b", r"miss(?:es|ed|ing)?\b", r"weak(?:er|ens?|ened|ness)?\b", "selloff",
    "sell-off", r"cut(?:s|ting)?\b", r"prob(?:e|es|ed|ing)\b",
];

/// Ordered: sectors are emitted in this order.
const SECTOR_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Financials",
        &[
            r"banks?\b", r"bank(?:ing|ers?)\b", r"fed\b", "federal reserve", "interest rate",
            "rate hike", "lender", r"credit\b", "insurer", "treasur", r"bonds?\b",
        ],
    ),
    (
        "Energy",
        &[r"oil\b", "crude", r"opec\b", "natural gas", "pipeline", "refiner", r"energy\b"],
    ),
    (
        "Technology",
        &[
            r"tech(?:s|nology|nologies)?\b", r"chips?\b", "chipmaker", "semiconductor", "software",
            "artificial intelligence", "nvidia", r"apple\b", "microsoft",
        ],
    ),
    (
        "Healthcare",
        &["pharma", r"drugs?\b", "drugmaker", "biotech", "vaccine", "hospital", r"health(?:care)?\b"],
    ),
    ("Consumer", &["retail", r"consumers?\b", "spending", "e-commerce", "restaurant"]),
    ("Industrials", &["manufactur", "factor(?:y|ies)", "airline", "shipping", "freight", "industrial"]),
    ("Real Estate", &["housing", "mortgage", "real estate", r"propert(?:y|ies)\b", "home sales"]),
    (
        "Materials",
        &[r"gold\b", r"silver\b", r"copper\b", "lithium", "rare earth", r"mining\b", r"steel\b"],
    ),
    ("Defense", &["defense", "defence", "military", "missile", "weapon"]),
    ("Digital Assets", &["bitcoin", "crypto", "ethereum", "stablecoin"]),
];

/// Sector used when no keyword matched, by category.
const CATEGORY_SECTOR: &[(&str, &str)] = &[
    ("us-markets", "Broad Market"),
    ("us-economy", "Financials"),
    ("technology", "Technology"),
    ("energy", "Energy"),
    ("commodities", "Materials"),
    ("middle-east", "Energy"),
];

const DEFAULT_SECTOR: &str = "Broad Market";

fn cue_regex(cues: &[&str]) -> Regex {
    Regex::new(&format!(r"(?i)\b(?:{})", cues.join("|"))).expect("cue regex")
}

static BULLISH_RE: Lazy<Regex> = Lazy::new(|| cue_regex(BULLISH_CUES));
static BEARISH_RE: Lazy<Regex> = Lazy::new(|| cue_regex(BEARISH_CUES));
static SECTOR_RES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    SECTOR_KEYWORDS
        .iter()
        .map(|(name, kws)| (*name, cue_regex(kws)))
        .collect()
});

/// Sentiment of a lowercased text from the two cue sets.
pub fn sentiment_of(text: &str) -> Sentiment {
    match (BULLISH_RE.is_match(text), BEARISH_RE.is_match(text)) {
        (true, true) => Sentiment::Mixed,
        (true, false) => Sentiment::Bullish,
        (false, true) => Sentiment::Bearish,
        (false, false) => Sentiment::Neutral,
    }
}

/// Sector names whose keywords appear in `text`, in table order.
pub fn matched_sectors(text: &str) -> Vec<&'static str> {
    SECTOR_RES
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(name, _)| *name)
        .collect()
}

#[derive(Debug, Clone)]
pub struct FallbackClassifier {
    default_region: Region,
    region_by_category: BTreeMap<String, Region>,
}

impl Default for FallbackClassifier {
    fn default() -> Self {
        Self::new(&FallbackConfig::default())
    }
}

impl FallbackClassifier {
    pub fn new(cfg: &FallbackConfig) -> Self {
        Self {
            default_region: cfg.default_region,
            region_by_category: cfg
                .region_by_category
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), *v))
                .collect(),
        }
    }

    pub fn region_for(&self, category: &str) -> Region {
        self.region_by_category
            .get(&category.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_region)
    }

    /// Classify one item. Pure: same item and reason → same result.
    pub fn classify(&self, item: &Item, reason: &str) -> ClassificationResult {
        let text = format!("{} {}", item.title, item.description).to_lowercase();
        let sentiment = sentiment_of(&text);
        let impact = match sentiment {
            Sentiment::Bullish => Impact::Bullish,
            Sentiment::Bearish => Impact::Bearish,
            Sentiment::Mixed | Sentiment::Neutral => Impact::Uncertain,
        };

        let mut names = matched_sectors(&text);
        if names.is_empty() {
            let cat = item.category.to_ascii_lowercase();
            let default = CATEGORY_SECTOR
                .iter()
                .find(|(c, _)| *c == cat)
                .map(|(_, s)| *s)
                .unwrap_or(DEFAULT_SECTOR);
            names.push(default);
        }

        let sectors = names
            .into_iter()
            .map(|name| SectorImpact {
                sector: name.to_string(),
                impact,
                reasoning: reason.to_string(),
                tickers: Vec::new(),
                timeframe: Timeframe::ShortTerm,
                confidence: Confidence::Low,
            })
            .collect();

        ClassificationResult {
            region: self.region_for(&item.category),
            summary: item.title.clone(),
            overall_sentiment: sentiment,
            sectors,
            key_insight: format!("Keyword-based estimate ({reason})"),
            gold: CommodityImpact::Neutral,
            silver: CommodityImpact::Neutral,
            rare_minerals: CommodityImpact::Neutral,
            stock_markets: sentiment.into(),
            origin: ResultOrigin::Fallback,
        }
    }
}
