//! SSE consumer for `GET /scan` that drives a [`ScanState`] as frames arrive.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::ACCEPT;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::reconcile::{ScanState, Transition};
use crate::scan::ScanParams;
use crate::stream::{FrameDecoder, ProtocolError};

const USER_AGENT: &str = concat!("news-impact-scanner/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The stream broke off before `complete` or `error`.
    #[error("stream interrupted: {0}")]
    Transport(String),
}

pub struct ScanClient {
    http: reqwest::Client,
    base_url: String,
}

impl ScanClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Stream one scan into `state`, calling `on_update` after every applied event.
    ///
    /// Returns `Ok` once the state is frozen by `complete`, a server `error` or
    /// `cancel`; check [`ScanState::lifecycle`] to tell them apart. A malformed
    /// frame or a broken connection fails the state and returns the error.
    pub async fn run<F>(
        &self,
        params: ScanParams,
        cancel: &CancellationToken,
        state: &mut ScanState,
        mut on_update: F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(&ScanState, &Transition),
    {
        let mut req = self
            .http
            .get(format!("{}/scan", self.base_url))
            .header(ACCEPT, "text/event-stream");
        if let Some(limit) = params.limit {
            req = req.query(&[("limit", limit)]);
        }

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                state.cancel();
                return Ok(());
            }
            r = req.send() => r?,
        };
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let mut body = resp.bytes_stream();
        let mut decoder = FrameDecoder::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(target: "scan", analyzed = state.analyzed_count(), "scan cancelled locally");
                    state.cancel();
                    return Ok(());
                }
                next = body.next() => next,
            };

            let bytes = match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    return Err(self.broken(state, &mut on_update, e.to_string()));
                }
                None => {
                    return Err(self.broken(
                        state,
                        &mut on_update,
                        "connection closed before completion".to_string(),
                    ));
                }
            };

            for frame in decoder.push(&bytes) {
                let event = match frame.decode() {
                    Ok(ev) => ev,
                    Err(e) => {
                        warn!(target: "scan", event = %frame.event, error = %e, "undecodable frame");
                        let t = state.fail(e.to_string());
                        on_update(state, &t);
                        return Err(e.into());
                    }
                };
                debug!(target: "scan", event = event.name(), "frame");
                let t = state.apply(event);
                on_update(state, &t);
                if state.lifecycle().is_frozen() {
                    return Ok(());
                }
            }
        }
    }

    fn broken<F>(&self, state: &mut ScanState, on_update: &mut F, reason: String) -> ClientError
    where
        F: FnMut(&ScanState, &Transition),
    {
        warn!(target: "scan", base_url = %self.base_url, %reason, "scan stream broken");
        let t = state.fail(reason.clone());
        on_update(state, &t);
        ClientError::Transport(reason)
    }
}
