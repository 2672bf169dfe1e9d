// src/ingest/mod.rs
pub mod dedup;
pub mod providers;
pub mod types;

use crate::context::{Interrupted, RunContext};
use crate::ingest::types::{Item, SearchProvider, SearchQuery, SourceFetchError};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Items returned by search providers.");
        describe_counter!(
            "ingest_source_errors_total",
            "Search queries that failed and degraded to an empty result."
        );
        describe_histogram!("ingest_fetch_ms", "Wall time of one parallel fetch in milliseconds.");
    });
}

/// Normalize text: decode entities, strip tags, unify quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Run every query concurrently and concatenate the results in query-list order.
///
/// A failing or hanging query contributes an empty list; it never aborts the fetch.
/// Cancellation likewise yields empty lists for the queries still in flight.
pub async fn fetch_all(
    provider: &dyn SearchProvider,
    queries: &[SearchQuery],
    ctx: &RunContext,
) -> Vec<Item> {
    ensure_metrics_described();
    let t0 = std::time::Instant::now();

    let calls = queries.iter().map(|q| async move {
        let res = match ctx.call(provider.search(q)).await {
            Ok(r) => r,
            Err(Interrupted::TimedOut) => Err(SourceFetchError::Timeout(
                ctx.call_timeout.as_millis() as u64,
            )),
            Err(Interrupted::Cancelled) => return Vec::new(),
        };
        match res {
            Ok(items) => {
                tracing::debug!(
                    target: "ingest",
                    provider = provider.name(),
                    category = %q.category,
                    count = items.len(),
                    "query ok"
                );
                items
            }
            Err(e) => {
                tracing::warn!(
                    target: "ingest",
                    error = %e,
                    provider = provider.name(),
                    query = %q.query,
                    "query failed; continuing with empty result"
                );
                counter!("ingest_source_errors_total").increment(1);
                Vec::new()
            }
        }
    });

    let per_query = join_all(calls).await;
    let out: Vec<Item> = per_query.into_iter().flatten().collect();

    histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("ingest_items_total").increment(out.len() as u64);
    out
}
