//! Client-side scan state as an explicit reducer over wire events.
//!
//! `ScanState::apply` never panics and never grows the key set beyond what the
//! `articles` event announced. Duplicate `analyzed` events overwrite in place.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::classify::{ClassificationResult, Region, Sentiment};
use crate::ingest::types::{ArticleKey, Item};
use crate::stream::protocol::{Progress, ScanEvent, StatusPayload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Pending(Item),
    Analyzed(Item, ClassificationResult),
}

impl Entry {
    pub fn item(&self) -> &Item {
        match self {
            Entry::Pending(it) | Entry::Analyzed(it, _) => it,
        }
    }

    pub fn result(&self) -> Option<&ClassificationResult> {
        match self {
            Entry::Pending(_) => None,
            Entry::Analyzed(_, r) => Some(r),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Idle,
    Streaming,
    Complete,
    Failed(String),
    Cancelled,
}

impl Lifecycle {
    pub fn is_frozen(&self) -> bool {
        matches!(
            self,
            Lifecycle::Complete | Lifecycle::Failed(_) | Lifecycle::Cancelled
        )
    }
}

/// What an event did to the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Updated,
    /// Duplicate, unknown key, out-of-order or post-freeze event.
    Ignored,
    /// Scan finished cleanly; one-shot post-processing may run now.
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct ScanState {
    order: Vec<ArticleKey>,
    entries: HashMap<ArticleKey, Entry>,
    analyzed: usize,
    total: Option<usize>,
    lifecycle: Lifecycle,
    last_status: Option<StatusPayload>,
}

/// Per-region aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionView {
    pub region: Region,
    pub count: usize,
    pub bullish: usize,
    pub bearish: usize,
    /// Mean polarity scaled to -100..=100.
    pub sentiment_score: i32,
}

/// Pure reducer form: `(state, event) -> state`.
pub fn reduce(mut state: ScanState, event: ScanEvent) -> ScanState {
    state.apply(event);
    state
}

fn score(polarities: impl Iterator<Item = i32>) -> i32 {
    let (sum, n) = polarities.fold((0i64, 0i64), |(s, n), p| (s + p as i64, n + 1));
    if n == 0 {
        0
    } else {
        ((sum * 100) as f64 / n as f64).round() as i32
    }
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: ScanEvent) -> Transition {
        if self.lifecycle.is_frozen() {
            return Transition::Ignored;
        }
        match event {
            ScanEvent::Status(s) => {
                self.last_status = Some(s);
                if self.lifecycle == Lifecycle::Idle {
                    self.lifecycle = Lifecycle::Streaming;
                }
                Transition::Updated
            }
            ScanEvent::Articles(a) => {
                if self.total.is_some() {
                    return Transition::Ignored;
                }
                for it in a.articles {
                    let key = it.key().clone();
                    if self.entries.contains_key(&key) {
                        continue;
                    }
                    self.order.push(key.clone());
                    self.entries.insert(key, Entry::Pending(it));
                }
                self.total = Some(a.total);
                self.lifecycle = Lifecycle::Streaming;
                Transition::Updated
            }
            ScanEvent::Analyzed(p) => {
                let key = p.article.key().clone();
                let Some(slot) = self.entries.get_mut(&key) else {
                    tracing::debug!(target: "reconcile", key = %key.short_hash(), "analyzed for unknown key ignored");
                    return Transition::Ignored;
                };
                if matches!(slot, Entry::Pending(_)) {
                    self.analyzed += 1;
                }
                // Keep the announced item; only the result is replaced.
                let item = slot.item().clone();
                *slot = Entry::Analyzed(item, p.analysis);
                Transition::Updated
            }
            ScanEvent::Complete(_) => {
                self.lifecycle = Lifecycle::Complete;
                Transition::Completed
            }
            ScanEvent::Error(e) => self.fail(e.message),
        }
    }

    /// Terminal failure: freeze and drop items that never got a result.
    pub fn fail(&mut self, message: impl Into<String>) -> Transition {
        if self.lifecycle.is_frozen() {
            return Transition::Ignored;
        }
        let message = message.into();
        self.entries.retain(|_, e| matches!(e, Entry::Analyzed(..)));
        self.order.retain(|k| self.entries.contains_key(k));
        self.lifecycle = Lifecycle::Failed(message.clone());
        Transition::Failed(message)
    }

    /// Consumer-initiated stop. Keeps what has arrived so far.
    pub fn cancel(&mut self) {
        if !self.lifecycle.is_frozen() {
            self.lifecycle = Lifecycle::Cancelled;
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn total(&self) -> Option<usize> {
        self.total
    }

    pub fn analyzed_count(&self) -> usize {
        self.analyzed
    }

    pub fn pending_count(&self) -> usize {
        self.entries.len() - self.analyzed
    }

    pub fn progress(&self) -> Progress {
        Progress {
            current: self.analyzed,
            total: self.total.unwrap_or(0),
        }
    }

    pub fn last_status(&self) -> Option<&StatusPayload> {
        self.last_status.as_ref()
    }

    pub fn get(&self, key: &ArticleKey) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Entries in announcement order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.order.iter().filter_map(|k| self.entries.get(k))
    }

    pub fn analyzed(&self) -> impl Iterator<Item = (&Item, &ClassificationResult)> {
        self.entries().filter_map(|e| match e {
            Entry::Analyzed(it, r) => Some((it, r)),
            Entry::Pending(_) => None,
        })
    }

    /// Aggregate sentiment over analyzed items, -100..=100.
    pub fn sentiment_score(&self) -> i32 {
        score(self.analyzed().map(|(_, r)| r.overall_sentiment.polarity()))
    }

    /// Analyzed items grouped by region, in region order.
    pub fn by_region(&self) -> BTreeMap<Region, Vec<(&Item, &ClassificationResult)>> {
        let mut out: BTreeMap<Region, Vec<_>> = BTreeMap::new();
        for (it, r) in self.analyzed() {
            out.entry(r.region).or_default().push((it, r));
        }
        out
    }

    pub fn region_views(&self) -> Vec<RegionView> {
        self.by_region()
            .into_iter()
            .map(|(region, rows)| RegionView {
                region,
                count: rows.len(),
                bullish: rows
                    .iter()
                    .filter(|(_, r)| r.overall_sentiment == Sentiment::Bullish)
                    .count(),
                bearish: rows
                    .iter()
                    .filter(|(_, r)| r.overall_sentiment == Sentiment::Bearish)
                    .count(),
                sentiment_score: score(rows.iter().map(|(_, r)| r.overall_sentiment.polarity())),
            })
            .collect()
    }
}
