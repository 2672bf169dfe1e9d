// tests/aggregator.rs
//
// Parallel fetch over all queries: partial failure, ordering, deadlines.

mod common;

use std::time::{Duration, Instant};

use common::{item, query, MapProvider};
use news_impact_scanner::context::RunContext;
use news_impact_scanner::ingest::fetch_all;
use news_impact_scanner::ingest::providers::newsapi::NewsApiProvider;

fn titles(items: &[news_impact_scanner::ingest::types::Item]) -> Vec<String> {
    items.iter().map(|i| i.title.clone()).collect()
}

#[tokio::test]
async fn failing_query_contributes_nothing_and_order_follows_queries() {
    let provider = MapProvider {
        answers: vec![
            (
                "markets".to_string(),
                vec![
                    item("https://news.test/1", "m1", "us-markets", 1),
                    item("https://news.test/2", "m2", "us-markets", 2),
                ],
            ),
            (
                "oil".to_string(),
                vec![item("https://news.test/3", "o1", "energy", 3)],
            ),
        ],
        delay: None,
    };
    let queries = vec![
        query("oil", "energy"),
        query("broken", "asia"),
        query("markets", "us-markets"),
    ];

    let out = fetch_all(&provider, &queries, &RunContext::new(Duration::from_secs(1))).await;
    assert_eq!(titles(&out), vec!["o1", "m1", "m2"]);
}

#[tokio::test]
async fn queries_run_in_parallel() {
    let answers = (0..8)
        .map(|i| (format!("q{i}"), vec![item(&format!("https://news.test/{i}"), "t", "asia", i)]))
        .collect();
    let provider = MapProvider {
        answers,
        delay: Some(Duration::from_millis(200)),
    };
    let queries: Vec<_> = (0..8).map(|i| query(&format!("q{i}"), "asia")).collect();

    let t0 = Instant::now();
    let out = fetch_all(&provider, &queries, &RunContext::new(Duration::from_secs(5))).await;
    assert_eq!(out.len(), 8);
    // sequential would take 1.6s
    assert!(t0.elapsed() < Duration::from_millis(1_000));
}

#[tokio::test]
async fn slow_queries_time_out_to_empty() {
    let provider = MapProvider {
        answers: vec![("slow".to_string(), vec![item("https://news.test/s", "s", "asia", 0)])],
        delay: Some(Duration::from_secs(30)),
    };
    let out = fetch_all(
        &provider,
        &[query("slow", "asia")],
        &RunContext::new(Duration::from_millis(20)),
    )
    .await;
    assert!(out.is_empty());
}

#[tokio::test]
async fn fixture_provider_tags_items_with_query_category() {
    let body = r#"{
        "status": "ok",
        "articles": [
            {"title": "Chipmakers rally", "source": {"name": "Wire"}, "url": "https://news.test/chips",
             "publishedAt": "2025-03-01T10:00:00Z", "description": "Semiconductor stocks climb"},
            {"title": "No link", "source": {"name": "Wire"}, "url": null,
             "publishedAt": "2025-03-01T09:00:00Z", "description": ""}
        ]
    }"#;
    let provider = NewsApiProvider::from_fixture(body);
    let out = fetch_all(
        &provider,
        &[query("chips", "technology")],
        &RunContext::new(Duration::from_secs(1)),
    )
    .await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].category, "technology");
    assert_eq!(out[0].source, "Wire");
}
