//! Deduplication and ranking of the aggregated item list.
//!
//! Order of the input matters: the first occurrence of a key wins, so callers
//! should pass the aggregator output in its stable query-list order.

use std::collections::HashSet;

use crate::config::{RankingConfig, RankingGroup};
use crate::ingest::providers::newsapi::REMOVED_TITLE;
use crate::ingest::types::{ArticleKey, Item};

/// Counts reported alongside the ranked list (for logs and the status event).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub input: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub kept: usize,
}

/// Drop empty/removed titles and repeated keys (first occurrence wins).
pub fn dedup(raw: Vec<Item>) -> (Vec<Item>, DedupStats) {
    let mut stats = DedupStats {
        input: raw.len(),
        ..Default::default()
    };
    let mut seen: HashSet<ArticleKey> = HashSet::with_capacity(raw.len());
    let mut keep = Vec::with_capacity(raw.len());

    for it in raw {
        let title = it.title.trim();
        if title.is_empty() || title == REMOVED_TITLE {
            stats.filtered += 1;
            continue;
        }
        if !seen.insert(it.url.clone()) {
            stats.duplicates += 1;
            continue;
        }
        keep.push(it);
    }
    stats.kept = keep.len();
    (keep, stats)
}

/// Full dedup → sort (newest first) → optional weighted rebalance → truncate.
pub fn dedup_and_rank(raw: Vec<Item>, cfg: &RankingConfig) -> (Vec<Item>, DedupStats) {
    let (mut items, mut stats) = dedup(raw);
    // Stable: equal timestamps keep their concatenation order.
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    let ranked = if cfg.groups.is_empty() {
        items.truncate(cfg.max_items);
        items
    } else {
        rebalance(items, &cfg.groups, cfg.max_items)
    };
    stats.kept = ranked.len();
    (ranked, stats)
}

/// Weighted interleave. `items` must already be sorted newest first.
///
/// Each group gets `round(weight * budget)` slots filled with its newest items.
/// Slots are interleaved by always drawing from the group with the lowest
/// filled/quota ratio; leftovers (over-quota or ungrouped) then fill the budget
/// in time order.
pub fn rebalance(items: Vec<Item>, groups: &[RankingGroup], budget: usize) -> Vec<Item> {
    let quotas: Vec<usize> = groups
        .iter()
        .map(|g| (g.weight.max(0.0) * budget as f64).round() as usize)
        .collect();

    let mut buckets: Vec<Vec<Item>> = vec![Vec::new(); groups.len()];
    let mut leftovers: Vec<Item> = Vec::new();

    for it in items {
        let slot = groups
            .iter()
            .position(|g| g.categories.iter().any(|c| c.eq_ignore_ascii_case(&it.category)));
        match slot {
            Some(gi) if buckets[gi].len() < quotas[gi] => buckets[gi].push(it),
            _ => leftovers.push(it),
        }
    }

    let mut out = Vec::with_capacity(budget);
    let mut taken = vec![0usize; groups.len()];
    while out.len() < budget {
        let next = (0..groups.len())
            .filter(|&gi| taken[gi] < buckets[gi].len())
            .min_by(|&a, &b| {
                let ra = taken[a] as f64 / quotas[a] as f64;
                let rb = taken[b] as f64 / quotas[b] as f64;
                ra.total_cmp(&rb).then(a.cmp(&b))
            });
        let Some(gi) = next else { break };
        out.push(buckets[gi][taken[gi]].clone());
        taken[gi] += 1;
    }

    // Leftovers stay in time order; the stable sort keeps ties in input order.
    leftovers.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    let room = budget.saturating_sub(out.len());
    out.extend(leftovers.into_iter().take(room));
    out
}
