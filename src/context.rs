//! Explicit per-run context: cancellation and per-call deadlines travel with the call
//! instead of living in ambient timers.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RunContext {
    pub cancel: CancellationToken,
    /// Upper bound for any single remote call (search or classify).
    pub call_timeout: Duration,
}

/// Why a bounded call did not produce its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Cancelled,
    TimedOut,
}

impl RunContext {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            call_timeout,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Await `fut`, giving up on cancellation or when `call_timeout` elapses.
    pub async fn call<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            res = tokio::time::timeout(self.call_timeout, fut) => {
                res.map_err(|_| Interrupted::TimedOut)
            }
        }
    }

    /// Sleep for `d`. Returns `false` if the run was cancelled first.
    pub async fn sleep(&self, d: Duration) -> bool {
        if d.is_zero() {
            return !self.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(d) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_times_out_on_hang() {
        let ctx = RunContext::new(Duration::from_millis(10));
        let out = ctx
            .call(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                1
            })
            .await;
        assert_eq!(out, Err(Interrupted::TimedOut));
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let ctx = RunContext::new(Duration::from_secs(5));
        ctx.cancel.cancel();
        assert_eq!(ctx.call(async { 1 }).await, Err(Interrupted::Cancelled));
        assert!(!ctx.sleep(Duration::from_secs(5)).await);
    }
}
