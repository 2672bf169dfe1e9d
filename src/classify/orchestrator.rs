//! Batch orchestration: fixed-size batches, bounded retry, atomic fallback.
//!
//! Batches run strictly one after another with a pause in between to stay under
//! upstream rate limits. A batch resolves entirely through the remote classifier
//! or entirely through the fallback, never a mix.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{ClassificationResult, Classifier, ClassifierError, FallbackClassifier, ResultOrigin};
use crate::config::BatchConfig;
use crate::context::{Interrupted, RunContext};
use crate::ingest::types::Item;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("classify_attempts_total", "Remote classifier calls.");
        describe_counter!(
            "classify_failures_total",
            "Remote classifier calls that failed (transport, status, protocol, timeout)."
        );
        describe_counter!(
            "classify_fallback_batches_total",
            "Batches resolved by the keyword fallback."
        );
        describe_histogram!("classify_batch_ms", "Time to resolve one batch in milliseconds.");
    });
}

/// One resolved batch: every item paired with its result, all from the same path.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// 0-based batch number within the run.
    pub index: usize,
    pub origin: ResultOrigin,
    pub attempts: u32,
    pub results: Vec<(Item, ClassificationResult)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("batch consumer went away")]
pub struct SinkClosed;

/// Receives batch outcomes as they complete. An error stops the run.
#[async_trait]
pub trait BatchSink: Send {
    async fn deliver(&mut self, outcome: BatchOutcome) -> Result<(), SinkClosed>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: usize,
    pub remote_batches: usize,
    pub fallback_batches: usize,
    pub items: usize,
    pub cancelled: bool,
}

pub struct Orchestrator {
    classifier: Arc<dyn Classifier>,
    fallback: FallbackClassifier,
    cfg: BatchConfig,
}

impl Orchestrator {
    pub fn new(classifier: Arc<dyn Classifier>, fallback: FallbackClassifier, cfg: BatchConfig) -> Self {
        Self {
            classifier,
            fallback,
            cfg,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.cfg.batch_size.max(1)
    }

    /// Resolve one batch. `None` means the run was cancelled mid-way.
    pub async fn resolve_batch(
        &self,
        batch: &[Item],
        ctx: &RunContext,
    ) -> Option<(ResultOrigin, u32, Vec<ClassificationResult>)> {
        ensure_metrics_described();
        let max_attempts = self.cfg.max_attempts.max(1);
        let mut attempts = 0u32;
        let mut last_err: Option<ClassifierError> = None;

        while attempts < max_attempts {
            attempts += 1;
            counter!("classify_attempts_total").increment(1);

            let err = match ctx.call(self.classifier.classify(batch)).await {
                Err(Interrupted::Cancelled) => return None,
                Err(Interrupted::TimedOut) => ClassifierError::Timeout(self.cfg.call_timeout_ms),
                Ok(Ok(results)) if results.len() == batch.len() => {
                    return Some((ResultOrigin::Remote, attempts, results));
                }
                Ok(Ok(results)) => ClassifierError::Protocol(format!(
                    "expected {} results, got {}",
                    batch.len(),
                    results.len()
                )),
                Ok(Err(e)) => e,
            };

            let retriable = !matches!(err, ClassifierError::Disabled);
            if retriable {
                counter!("classify_failures_total").increment(1);
                warn!(
                    target: "classify",
                    classifier = self.classifier.name(),
                    attempt = attempts,
                    max_attempts,
                    error = %err,
                    "classifier attempt failed"
                );
            }
            last_err = Some(err);
            if !retriable {
                break;
            }
            if attempts < max_attempts && !ctx.sleep(self.cfg.retry_delay()).await {
                return None;
            }
        }

        counter!("classify_fallback_batches_total").increment(1);
        let reason = match &last_err {
            Some(ClassifierError::Disabled) => "Remote classifier disabled".to_string(),
            Some(e) => format!("Remote classifier failed after {attempts} attempt(s): {e}"),
            None => "Remote classifier unavailable".to_string(),
        };
        let results = batch
            .iter()
            .map(|it| self.fallback.classify(it, &reason))
            .collect();
        Some((ResultOrigin::Fallback, attempts, results))
    }

    /// Classify `items` batch by batch, handing each outcome to `sink` as soon as it resolves.
    pub async fn run(&self, items: &[Item], ctx: &RunContext, sink: &mut dyn BatchSink) -> RunSummary {
        let mut summary = RunSummary::default();
        let total_batches = items.len().div_ceil(self.batch_size());

        for (index, chunk) in items.chunks(self.batch_size()).enumerate() {
            if ctx.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let t0 = std::time::Instant::now();
            let Some((origin, attempts, results)) = self.resolve_batch(chunk, ctx).await else {
                summary.cancelled = true;
                break;
            };
            histogram!("classify_batch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            summary.batches += 1;
            summary.items += chunk.len();
            match origin {
                ResultOrigin::Remote => summary.remote_batches += 1,
                ResultOrigin::Fallback => summary.fallback_batches += 1,
            }
            debug!(
                target: "classify",
                batch = index + 1,
                of = total_batches,
                ?origin,
                attempts,
                size = chunk.len(),
                "batch resolved"
            );

            let outcome = BatchOutcome {
                index,
                origin,
                attempts,
                results: chunk.iter().cloned().zip(results).collect(),
            };
            if sink.deliver(outcome).await.is_err() {
                summary.cancelled = true;
                break;
            }

            let is_last = index + 1 == total_batches;
            if !is_last && !ctx.sleep(self.cfg.inter_batch_delay()).await {
                summary.cancelled = true;
                break;
            }
        }

        info!(
            target: "classify",
            batches = summary.batches,
            remote = summary.remote_batches,
            fallback = summary.fallback_batches,
            cancelled = summary.cancelled,
            "orchestration finished"
        );
        summary
    }
}

/// Collects outcomes in memory. Handy for tests and offline runs.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub outcomes: Vec<BatchOutcome>,
}

#[async_trait]
impl BatchSink for CollectingSink {
    async fn deliver(&mut self, outcome: BatchOutcome) -> Result<(), SinkClosed> {
        self.outcomes.push(outcome);
        Ok(())
    }
}
