//! One scan, end to end: fetch → dedup/rank → announce → classify in batches → complete.
//!
//! A scan runs on its own task and talks to the connection only through the
//! event channel. Dropping the receiver (client went away) cancels the run.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::classify::{
    build_classifier, Classifier, FallbackClassifier, Orchestrator, RunSummary, SinkClosed,
};
use crate::config::{FatalConfigError, RankingConfig, ScanConfig};
use crate::context::RunContext;
use crate::history::{RunRecord, ScanSink};
use crate::ingest::dedup::dedup_and_rank;
use crate::ingest::fetch_all;
use crate::ingest::providers::newsapi::NewsApiProvider;
use crate::ingest::types::SearchProvider;
use crate::stream::{Emitter, Phase, ScanEvent};

/// Channel depth between the scan task and the SSE writer.
const EVENT_BUFFER: usize = 64;

/// Everything a scan needs, resolved once from configuration.
#[derive(Clone)]
pub struct ScanServices {
    pub config: Arc<ScanConfig>,
    pub search: Arc<dyn SearchProvider>,
    pub classifier: Arc<dyn Classifier>,
    pub sink: Arc<dyn ScanSink>,
}

impl ScanServices {
    /// Wire real upstreams. Fails when a required credential is missing.
    pub fn from_config(config: ScanConfig, sink: Arc<dyn ScanSink>) -> Result<Self, FatalConfigError> {
        let api_key = config.search.resolve_api_key()?;
        let search = NewsApiProvider::new(
            &config.search.base_url,
            &api_key,
            &config.search.language,
            std::time::Duration::from_millis(config.search.timeout_ms),
        )
        .map_err(|e| FatalConfigError::HttpClient(e.to_string()))?;
        let classifier = build_classifier(&config.ai, config.batch.call_timeout())?;
        Ok(Self {
            config: Arc::new(config),
            search: Arc::new(search),
            classifier,
            sink,
        })
    }
}

/// Per-request knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanParams {
    /// Overrides the item budget, clamped to `1..=ranking.max_items`.
    pub limit: Option<usize>,
}

fn effective_ranking(cfg: &RankingConfig, params: ScanParams) -> RankingConfig {
    let mut r = cfg.clone();
    if let Some(limit) = params.limit {
        r.max_items = limit.clamp(1, cfg.max_items.max(1));
    }
    r
}

/// Drive one scan into `emitter`. Returns early (without `complete`) when cancelled.
pub async fn run_scan(
    services: &ScanServices,
    params: ScanParams,
    ctx: &RunContext,
    emitter: &mut Emitter,
) -> Result<RunSummary, SinkClosed> {
    let cfg = &services.config;
    counter!("scan_runs_total").increment(1);

    emitter
        .status(
            Phase::Fetching,
            format!("Fetching news from {} queries", cfg.queries.len()),
            None,
        )
        .await?;
    let raw = fetch_all(services.search.as_ref(), &cfg.queries, ctx).await;
    if ctx.is_cancelled() {
        return Ok(RunSummary {
            cancelled: true,
            ..Default::default()
        });
    }

    emitter
        .status(Phase::Ranking, format!("Deduplicating {} articles", raw.len()), None)
        .await?;
    let ranking = effective_ranking(&cfg.ranking, params);
    let (items, stats) = dedup_and_rank(raw, &ranking);
    info!(
        target: "scan",
        input = stats.input,
        filtered = stats.filtered,
        duplicates = stats.duplicates,
        kept = stats.kept,
        "ranked items"
    );

    emitter
        .status(
            Phase::Analyzing,
            format!("Analyzing {} articles", items.len()),
            Some(items.len()),
        )
        .await?;
    emitter.articles(&items).await?;

    let orchestrator = Orchestrator::new(
        services.classifier.clone(),
        FallbackClassifier::new(&cfg.fallback),
        cfg.batch.clone(),
    );
    let summary = orchestrator.run(&items, ctx, emitter).await;
    if summary.cancelled {
        counter!("scan_cancelled_total").increment(1);
        info!(target: "scan", analyzed = emitter.state().analyzed_count(), "scan cancelled by consumer");
        return Ok(summary);
    }

    // The consumer may have left during the last batch.
    if ctx.is_cancelled() {
        counter!("scan_cancelled_total").increment(1);
        return Ok(RunSummary {
            cancelled: true,
            ..summary
        });
    }

    // Every item has its result at this point; record before the terminal event
    // so anyone reacting to `complete` already sees the run in history.
    services.sink.record_run(RunRecord::from_state(emitter.state()));
    emitter.complete().await?;
    Ok(summary)
}

/// Start a scan on a background task and hand back its event stream plus the
/// token that cancels it.
///
/// A configuration error becomes a single `error` event. A panic inside the scan
/// task becomes a terminal `error` event too.
pub fn start_scan(
    services: Result<ScanServices, FatalConfigError>,
    params: ScanParams,
) -> (mpsc::Receiver<ScanEvent>, RunContext) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    let services = match services {
        Ok(s) => s,
        Err(e) => {
            error!(target: "scan", error = %e, "scan rejected: configuration");
            let ctx = RunContext::new(std::time::Duration::from_secs(1));
            // Fresh channel with spare capacity: this cannot fail.
            let _ = tx.try_send(ScanEvent::error(e.to_string()));
            return (rx, ctx);
        }
    };

    let ctx = RunContext::new(services.config.batch.call_timeout());
    let task_ctx = ctx.clone();
    tokio::spawn(async move {
        let inner_tx = tx.clone();
        let handle = tokio::spawn(async move {
            let mut emitter = Emitter::new(inner_tx);
            run_scan(&services, params, &task_ctx, &mut emitter).await
        });
        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(SinkClosed)) => {
                info!(target: "scan", "consumer disconnected");
            }
            Err(join_err) if join_err.is_panic() => {
                error!(target: "scan", "scan task panicked");
                let _ = tx.send(ScanEvent::error("Scan aborted by an internal error")).await;
            }
            Err(_) => {}
        }
    });

    (rx, ctx)
}
