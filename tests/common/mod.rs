// tests/common/mod.rs
// Shared builders and scripted collaborators for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use news_impact_scanner::classify::{
    ClassificationResult, Classifier, ClassifierError, CommodityImpact, Region, ResultOrigin,
    Sentiment,
};
use news_impact_scanner::ingest::types::{ArticleKey, Item, SearchProvider, SearchQuery, SourceFetchError};

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn item(url: &str, title: &str, category: &str, secs: i64) -> Item {
    Item {
        url: ArticleKey::from_url(url).unwrap(),
        title: title.to_string(),
        source: "Wire".to_string(),
        published_at: ts(secs),
        category: category.to_string(),
        description: String::new(),
    }
}

/// `n` distinct items, newest first.
pub fn items(n: usize) -> Vec<Item> {
    (0..n)
        .map(|i| {
            item(
                &format!("https://news.test/a/{i}"),
                &format!("Headline {i}"),
                "us-markets",
                1_000 - i as i64,
            )
        })
        .collect()
}

pub fn remote_result(it: &Item) -> ClassificationResult {
    ClassificationResult {
        region: Region::Europe,
        summary: format!("remote: {}", it.title),
        overall_sentiment: Sentiment::Bearish,
        sectors: Vec::new(),
        key_insight: "model insight".to_string(),
        gold: CommodityImpact::Neutral,
        silver: CommodityImpact::Neutral,
        rare_minerals: CommodityImpact::Neutral,
        stock_markets: CommodityImpact::Bearish,
        origin: ResultOrigin::Remote,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Always answers.
    Healthy,
    /// Fails the first `n` calls, then answers.
    FailFirst(usize),
    /// Always fails.
    Outage,
    /// Never answers.
    Hang,
    /// Answers with the wrong number of results.
    ShortCount,
}

/// Classifier that follows a script and records every batch it was asked about.
pub struct ScriptedClassifier {
    script: Script,
    calls: AtomicUsize,
    pub batches: Mutex<Vec<Vec<String>>>,
}

impl ScriptedClassifier {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().iter().map(|b| b.len()).collect()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, batch: &[Item]) -> Result<Vec<ClassificationResult>, ClassifierError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches
            .lock()
            .push(batch.iter().map(|i| i.key().as_str().to_string()).collect());
        match self.script {
            Script::Healthy => Ok(batch.iter().map(remote_result).collect()),
            Script::FailFirst(k) if n >= k => Ok(batch.iter().map(remote_result).collect()),
            Script::FailFirst(_) | Script::Outage => Err(ClassifierError::Status {
                status: 503,
                body: "overloaded".to_string(),
            }),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ClassifierError::Protocol("unreachable".to_string()))
            }
            Script::ShortCount => Ok(batch.iter().skip(1).map(remote_result).collect()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Search provider answering per query string; unknown queries fail.
pub struct MapProvider {
    pub answers: Vec<(String, Vec<Item>)>,
    pub delay: Option<Duration>,
}

#[async_trait]
impl SearchProvider for MapProvider {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Item>, SourceFetchError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.answers
            .iter()
            .find(|(q, _)| *q == query.query)
            .map(|(_, items)| items.clone())
            .ok_or(SourceFetchError::Status { status: 500 })
    }

    fn name(&self) -> &'static str {
        "map"
    }
}

pub fn query(q: &str, category: &str) -> SearchQuery {
    SearchQuery {
        query: q.to_string(),
        page_size: 10,
        category: category.to_string(),
    }
}
