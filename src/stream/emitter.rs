//! Server-side event emitter. Owns the progress counter and a mirrored
//! `ScanState`, and pushes typed events into the per-connection channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::protocol::{
    AnalyzedPayload, ArticlesPayload, CompletePayload, Phase, Progress, ScanEvent, StatusPayload,
};
use crate::classify::{BatchOutcome, BatchSink, SinkClosed};
use crate::ingest::types::Item;
use crate::reconcile::ScanState;

pub struct Emitter {
    tx: mpsc::Sender<ScanEvent>,
    mirror: ScanState,
    current: usize,
    total: usize,
}

impl Emitter {
    pub fn new(tx: mpsc::Sender<ScanEvent>) -> Self {
        Self {
            tx,
            mirror: ScanState::new(),
            current: 0,
            total: 0,
        }
    }

    async fn send(&mut self, ev: ScanEvent) -> Result<(), SinkClosed> {
        self.mirror.apply(ev.clone());
        self.tx.send(ev).await.map_err(|_| SinkClosed)
    }

    pub async fn status(
        &mut self,
        phase: Phase,
        message: impl Into<String>,
        total: Option<usize>,
    ) -> Result<(), SinkClosed> {
        self.send(ScanEvent::Status(StatusPayload {
            phase,
            message: message.into(),
            total,
        }))
        .await
    }

    /// Announce the item set. Everything after this refers to these keys.
    pub async fn articles(&mut self, items: &[Item]) -> Result<(), SinkClosed> {
        self.total = items.len();
        self.send(ScanEvent::Articles(ArticlesPayload {
            articles: items.to_vec(),
            total: items.len(),
        }))
        .await
    }

    pub async fn complete(&mut self) -> Result<(), SinkClosed> {
        self.send(ScanEvent::Complete(CompletePayload { total: self.total }))
            .await
    }

    pub async fn error(&mut self, message: impl Into<String>) -> Result<(), SinkClosed> {
        self.send(ScanEvent::error(message)).await
    }

    /// What a client would see if it consumed every event sent so far.
    pub fn state(&self) -> &ScanState {
        &self.mirror
    }
}

#[async_trait]
impl BatchSink for Emitter {
    async fn deliver(&mut self, outcome: BatchOutcome) -> Result<(), SinkClosed> {
        for (article, analysis) in outcome.results {
            self.current += 1;
            let progress = Progress {
                current: self.current,
                total: self.total,
            };
            self.send(ScanEvent::Analyzed(Box::new(AnalyzedPayload {
                article,
                analysis,
                progress,
            })))
            .await?;
        }
        Ok(())
    }
}
