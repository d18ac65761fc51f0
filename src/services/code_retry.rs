//! Background retry of pending code requests.
//!
//! Claims due requests with `FOR UPDATE SKIP LOCKED`, commits the claim, and
//! only then calls the marking API, so no row lock is held across the call.

use crate::ports::CodeRequestRepository;
use crate::use_cases::{CodeFulfilment, FulfilmentOutcome, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub claimed: usize,
    pub completed: usize,
    pub pending: usize,
    pub failed: usize,
    pub errors: usize,
}

pub struct CodeRetryJob {
    code_requests: Arc<dyn CodeRequestRepository>,
    fulfilment: CodeFulfilment,
    policy: RetryPolicy,
    batch_size: i64,
}

impl CodeRetryJob {
    pub fn new(
        code_requests: Arc<dyn CodeRequestRepository>,
        fulfilment: CodeFulfilment,
        policy: RetryPolicy,
        batch_size: i64,
    ) -> Self {
        Self {
            code_requests,
            fulfilment,
            policy,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run_batch(&self) -> anyhow::Result<BatchSummary> {
        let claimed = self
            .code_requests
            .claim_due(self.batch_size, self.policy.lease)
            .await?;

        let mut summary = BatchSummary {
            claimed: claimed.len(),
            ..Default::default()
        };
        if claimed.is_empty() {
            return Ok(summary);
        }

        debug!("Retrying {} pending code request(s)", claimed.len());

        for request in &claimed {
            match self.fulfilment.execute(request).await {
                Ok(FulfilmentOutcome::Completed { .. }) => summary.completed += 1,
                Ok(FulfilmentOutcome::Pending { .. }) => summary.pending += 1,
                Ok(FulfilmentOutcome::Failed { .. }) => summary.failed += 1,
                Err(e) => {
                    // lease expiry hands the row back to a later batch
                    error!(code_request_id = request.id, "Code retry bookkeeping failed: {}", e);
                    summary.errors += 1;
                }
            }
        }

        info!(
            claimed = summary.claimed,
            completed = summary.completed,
            pending = summary.pending,
            failed = summary.failed,
            "Code retry batch finished"
        );
        Ok(summary)
    }

    /// Runs a batch every `interval` until `shutdown` flips to true.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "Code retry job started");
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_batch().await {
                        error!("Code retry batch error: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    info!("Code retry job stopped");
                    return;
                }
            }
        }
    }
}
