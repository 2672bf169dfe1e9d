use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::{FatalConfigError, ScanConfig};
use crate::history::{History, RunRecord, ScanSink};
use crate::scan::{start_scan, ScanParams, ScanServices};

#[derive(Clone)]
pub struct AppState {
    pub services: Result<ScanServices, FatalConfigError>,
    pub history: Arc<History>,
}

impl AppState {
    /// Build from config. Missing credentials do not stop the server; each scan
    /// reports them as an `error` event instead.
    pub fn from_config(config: ScanConfig) -> Self {
        let history = Arc::new(History::with_capacity(config.history_capacity));
        let sink: Arc<dyn ScanSink> = history.clone();
        let services = ScanServices::from_config(config, sink);
        if let Err(e) = &services {
            warn!(error = %e, "scanner not fully configured; scans will fail fast");
        }
        Self { services, history }
    }

    /// Build with explicit collaborators (tests, embedding).
    pub fn with_services(services: ScanServices, history: Arc<History>) -> Self {
        Self {
            services: Ok(services),
            history,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/scan", get(scan))
        .route("/history", get(history))
        .route("/watchlist/{user}", get(get_watchlist).put(put_watchlist))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct ScanQuery {
    limit: Option<usize>,
}

/// GET /scan - one scan streamed as SSE: status* → articles → analyzed* → complete | error
async fn scan(
    State(state): State<AppState>,
    Query(q): Query<ScanQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(target: "scan", limit = ?q.limit, "scan requested");
    let (mut rx, ctx) = start_scan(state.services.clone(), ScanParams { limit: q.limit });
    let guard = ctx.cancel.clone().drop_guard();

    let stream = async_stream::stream! {
        // Dropped with the stream: a client disconnect cancels the scan.
        let _guard = guard;
        while let Some(ev) = rx.recv().await {
            let terminal = ev.is_terminal();
            match ev.data_json() {
                Ok(data) => {
                    debug!(target: "scan", event = ev.name(), "sse send");
                    yield Ok(Event::default().event(ev.name()).data(data));
                }
                Err(e) => warn!(target: "scan", event = ev.name(), error = %e, "failed to serialize event"),
            }
            if terminal {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    n: Option<usize>,
}

async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Json<Vec<RunRecord>> {
    Json(state.history.snapshot_last_n(q.n.unwrap_or(10)))
}

#[derive(Debug, Deserialize)]
struct WatchlistIn {
    tickers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WatchlistOut {
    user: String,
    tickers: Vec<String>,
}

async fn get_watchlist(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Json<WatchlistOut> {
    let tickers = state.history.watchlist(&user).unwrap_or_default();
    Json(WatchlistOut { user, tickers })
}

async fn put_watchlist(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(body): Json<WatchlistIn>,
) -> Json<WatchlistOut> {
    let tickers = state.history.upsert_watchlist(&user, body.tickers);
    Json(WatchlistOut { user, tickers })
}
