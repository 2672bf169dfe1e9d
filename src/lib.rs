// src/lib.rs
// Public library surface for the server binary, the CLI and integration tests.

pub mod api;
pub mod classify;
pub mod client;
pub mod config;
pub mod context;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod reconcile;
pub mod scan;
pub mod stream;

pub use crate::api::{router, AppState};
pub use crate::reconcile::{reduce, ScanState};
pub use crate::stream::ScanEvent;

use axum::Router;
use tracing::info;

/// Full in-process app: scan API plus `/metrics`, built from the default config
/// location. Used by the server binary and by tests that want the real wiring.
pub async fn app() -> anyhow::Result<Router> {
    let config = crate::config::ScanConfig::load_default()?;
    let metrics = crate::metrics::Metrics::init(&config)?;
    let state = AppState::from_config(config);
    info!(configured = state.services.is_ok(), "scanner app built");
    Ok(router(state).merge(metrics.router()))
}
