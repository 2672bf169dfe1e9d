//! In-memory sink for completed scans and per-user ticker watchlists.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::classify::Region;
use crate::reconcile::ScanState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionScore {
    pub region: Region,
    pub sentiment_score: i32,
}

/// One append-only record per completed scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub ts_unix: u64,
    pub total_articles: usize,
    pub sentiment_score: i32,
    pub regions: Vec<RegionScore>,
}

impl RunRecord {
    pub fn from_state(state: &ScanState) -> Self {
        Self {
            ts_unix: now_unix(),
            total_articles: state.total().unwrap_or(0),
            sentiment_score: state.sentiment_score(),
            regions: state
                .region_views()
                .into_iter()
                .map(|v| RegionScore {
                    region: v.region,
                    sentiment_score: v.sentiment_score,
                })
                .collect(),
        }
    }
}

/// Where completed scans go. Only clean completions are recorded.
pub trait ScanSink: Send + Sync {
    fn record_run(&self, record: RunRecord);
    fn upsert_watchlist(&self, user: &str, tickers: Vec<String>) -> Vec<String>;
}

#[derive(Debug)]
pub struct History {
    runs: Mutex<Vec<RunRecord>>,
    watchlists: Mutex<HashMap<String, Vec<String>>>,
    cap: usize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicked writer cannot leave these collections half-updated.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl History {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            runs: Mutex::new(Vec::with_capacity(cap)),
            watchlists: Mutex::new(HashMap::new()),
            cap,
        }
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<RunRecord> {
        let v = lock(&self.runs);
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }

    pub fn watchlist(&self, user: &str) -> Option<Vec<String>> {
        lock(&self.watchlists).get(user).cloned()
    }
}

impl ScanSink for History {
    fn record_run(&self, record: RunRecord) {
        let mut v = lock(&self.runs);
        v.push(record);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    fn upsert_watchlist(&self, user: &str, tickers: Vec<String>) -> Vec<String> {
        let mut clean: Vec<String> = Vec::with_capacity(tickers.len());
        for t in tickers {
            let t = t.trim().to_ascii_uppercase();
            if !t.is_empty() && !clean.contains(&t) {
                clean.push(t);
            }
        }
        lock(&self.watchlists).insert(user.to_string(), clean.clone());
        clean
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
