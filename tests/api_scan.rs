// tests/api_scan.rs
//
// HTTP-level tests for the scan API without opening sockets.
// The router is exercised directly via tower::ServiceExt::oneshot with a
// fixture search provider and in-process classifiers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt as _;

use news_impact_scanner::classify::{
    ClassificationResult, Classifier, ClassifierError, DisabledClassifier, FallbackClassifier,
    ResultOrigin,
};
use news_impact_scanner::config::ScanConfig;
use news_impact_scanner::context::RunContext;
use news_impact_scanner::history::History;
use news_impact_scanner::ingest::providers::newsapi::NewsApiProvider;
use news_impact_scanner::ingest::types::Item;
use news_impact_scanner::scan::{run_scan, ScanParams, ScanServices};
use news_impact_scanner::stream::{Emitter, FrameDecoder};
use news_impact_scanner::{router, AppState, ScanEvent};

const BODY_LIMIT: usize = 4 * 1024 * 1024;

fn fixture_body(n: usize) -> String {
    let articles: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "title": format!("Banks rally as markets climb {i}"),
                "source": {"name": "Wire"},
                "url": format!("https://news.test/story/{i}"),
                "publishedAt": format!("2025-03-01T10:{:02}:00Z", 59 - i),
                "description": "stocks gain"
            })
        })
        .collect();
    json!({"status": "ok", "articles": articles}).to_string()
}

fn test_config() -> ScanConfig {
    let mut cfg = ScanConfig::default();
    cfg.queries.truncate(2);
    cfg.ranking.groups.clear();
    cfg.batch.retry_delay_ms = 0;
    cfg.batch.inter_batch_delay_ms = 0;
    cfg
}

fn app_with(classifier: Arc<dyn Classifier>, n: usize) -> (Router, Arc<History>) {
    let history = Arc::new(History::with_capacity(10));
    let services = ScanServices {
        config: Arc::new(test_config()),
        search: Arc::new(NewsApiProvider::from_fixture(&fixture_body(n))),
        classifier,
        sink: history.clone(),
    };
    (router(AppState::with_services(services, history.clone())), history)
}

async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
    let resp = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn decode_all(text: &str) -> Vec<ScanEvent> {
    FrameDecoder::new()
        .push(text.as_bytes())
        .iter()
        .map(|f| f.decode().unwrap())
        .collect()
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _) = app_with(Arc::new(DisabledClassifier), 1);
    let (status, body) = get_text(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.trim(), "OK");
}

#[tokio::test]
async fn scan_streams_every_item_then_completes_and_records_history() {
    let (app, history) = app_with(Arc::new(DisabledClassifier), 12);
    let (status, body) = get_text(app.clone(), "/scan").await;
    assert_eq!(status, StatusCode::OK);

    let events = decode_all(&body);
    let first_analyzed = events.iter().position(|e| e.name() == "analyzed").unwrap();
    let articles_at = events.iter().position(|e| e.name() == "articles").unwrap();
    assert!(articles_at < first_analyzed);
    assert!(events[..articles_at].iter().all(|e| e.name() == "status"));

    let analyzed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Analyzed(p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(analyzed.len(), 12);
    for (n, p) in analyzed.iter().enumerate() {
        assert_eq!(p.progress.current, n + 1);
        assert_eq!(p.progress.total, 12);
        assert_eq!(p.analysis.origin, ResultOrigin::Fallback);
    }
    match events.last().unwrap() {
        ScanEvent::Complete(c) => assert_eq!(c.total, 12),
        other => panic!("expected complete, got {other:?}"),
    }

    let runs = history.snapshot_last_n(5);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].total_articles, 12);
    assert!(runs[0].sentiment_score > 0);

    let (_, hist) = get_text(app, "/history?n=5").await;
    let v: Value = serde_json::from_str(&hist).unwrap();
    assert_eq!(v.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn limit_caps_the_item_budget() {
    let (app, _) = app_with(Arc::new(DisabledClassifier), 12);
    let (_, body) = get_text(app, "/scan?limit=3").await;
    let events = decode_all(&body);
    let total = events.iter().find_map(|e| match e {
        ScanEvent::Articles(a) => Some(a.total),
        _ => None,
    });
    assert_eq!(total, Some(3));
    assert_eq!(events.iter().filter(|e| e.name() == "analyzed").count(), 3);
}

#[tokio::test]
async fn missing_credentials_yield_a_single_error_event() {
    let mut cfg = test_config();
    cfg.search.api_key = String::new();
    let state = AppState::from_config(cfg);
    let history = state.history.clone();

    let (status, body) = get_text(router(state), "/scan").await;
    assert_eq!(status, StatusCode::OK);
    let events = decode_all(&body);
    assert_eq!(events.len(), 1);
    match &events[0] {
        ScanEvent::Error(e) => assert!(e.message.contains("NEWS_API_KEY")),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(history.snapshot_last_n(5).is_empty());
}

struct Panicking;

#[async_trait]
impl Classifier for Panicking {
    async fn classify(&self, _batch: &[Item]) -> Result<Vec<ClassificationResult>, ClassifierError> {
        panic!("classifier bug");
    }
    fn name(&self) -> &'static str {
        "panicking"
    }
}

#[tokio::test]
async fn pipeline_panic_becomes_terminal_error() {
    let (app, history) = app_with(Arc::new(Panicking), 2);
    let (_, body) = get_text(app, "/scan").await;
    let events = decode_all(&body);
    assert!(matches!(events.last(), Some(ScanEvent::Error(_))));
    assert!(history.snapshot_last_n(5).is_empty());
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Never answers; flips `dropped` once its call is abandoned.
struct Stuck {
    started: Arc<AtomicBool>,
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl Classifier for Stuck {
    async fn classify(&self, _batch: &[Item]) -> Result<Vec<ClassificationResult>, ClassifierError> {
        let _flag = DropFlag(self.dropped.clone());
        self.started.store(true, Ordering::SeqCst);
        std::future::pending::<Result<Vec<ClassificationResult>, ClassifierError>>().await
    }
    fn name(&self) -> &'static str {
        "stuck"
    }
}

#[tokio::test]
async fn client_disconnect_cancels_the_run() {
    let started = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicBool::new(false));
    let (app, history) = app_with(
        Arc::new(Stuck {
            started: started.clone(),
            dropped: dropped.clone(),
        }),
        6,
    );

    let resp = app
        .oneshot(Request::get("/scan").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let mut body = resp.into_body().into_data_stream();
    let mut decoder = FrameDecoder::new();
    'read: while let Some(chunk) = body.next().await {
        for frame in decoder.push(&chunk.unwrap()) {
            if frame.event == "articles" {
                break 'read;
            }
        }
    }
    assert!(
        wait_for(&started).await,
        "classifier call should be in flight"
    );
    drop(body);

    let cancelled = wait_for(&dropped).await;
    assert!(cancelled, "in-flight classifier call should be abandoned");
    assert!(history.snapshot_last_n(5).is_empty());
}

/// Answers every batch but cancels the run while doing so.
struct CancelsWhileAnswering(CancellationToken);

#[async_trait]
impl Classifier for CancelsWhileAnswering {
    async fn classify(&self, batch: &[Item]) -> Result<Vec<ClassificationResult>, ClassifierError> {
        self.0.cancel();
        let fallback = FallbackClassifier::default();
        Ok(batch.iter().map(|it| fallback.classify(it, "test")).collect())
    }
    fn name(&self) -> &'static str {
        "cancels-while-answering"
    }
}

#[tokio::test]
async fn cancel_during_last_batch_skips_history_and_complete() {
    let ctx = RunContext::new(Duration::from_secs(5));
    let history = Arc::new(History::with_capacity(8));
    let services = ScanServices {
        config: Arc::new(test_config()),
        search: Arc::new(NewsApiProvider::from_fixture(&fixture_body(1))),
        classifier: Arc::new(CancelsWhileAnswering(ctx.cancel.clone())),
        sink: history.clone(),
    };
    let (tx, mut rx) = mpsc::channel(64);
    let mut emitter = Emitter::new(tx);

    let summary = run_scan(&services, ScanParams::default(), &ctx, &mut emitter)
        .await
        .unwrap();
    drop(emitter);

    assert!(summary.cancelled);
    assert!(history.snapshot_last_n(5).is_empty());
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    assert!(!events.iter().any(|ev| matches!(ev, ScanEvent::Complete(_))));
}

async fn wait_for(flag: &AtomicBool) -> bool {
    for _ in 0..100 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn watchlist_round_trip() {
    let (app, _) = app_with(Arc::new(DisabledClassifier), 1);

    let put = Request::builder()
        .method("PUT")
        .uri("/watchlist/alice")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"tickers":["spy"," gld ","SPY"]}"#))
        .unwrap();
    let resp = app.clone().oneshot(put).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (_, body) = get_text(app, "/watchlist/alice").await;
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["user"], "alice");
    assert_eq!(v["tickers"], json!(["SPY", "GLD"]));
}
