//! One attempt at retrieving the codes of a pending code request, shared by
//! the order endpoint and the retry job.

use crate::config::Config;
use crate::domain::{CodeRequest, CodeRequestStatus};
use crate::marking::{CodeIssuer, CodeIssuerError};
use crate::metrics::Metrics;
use crate::ports::{CodeRequestRepository, RepositoryError};
use crate::services::artifacts::ArtifactStore;
use std::sync::Arc;
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_backoff: Duration,
    /// How long a claimed request stays invisible to other workers.
    pub lease: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.code_retry.max_attempts.max(1),
            base_backoff: config.code_retry.interval,
            lease: (config.marking.timeout * 2).max(Duration::from_secs(60)),
        }
    }

    /// Delay before the next attempt after `attempts` failed ones:
    /// base, 2x base, 4x base, ... capped at an hour.
    pub fn backoff(&self, attempts: i32) -> Duration {
        let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(MAX_BACKOFF)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FulfilmentOutcome {
    Completed {
        codes: Vec<String>,
        artifact: Option<String>,
    },
    /// Left pending for the retry job.
    Pending { error: String },
    Failed {
        error: String,
        partial_codes: Vec<String>,
    },
}

impl FulfilmentOutcome {
    pub fn status(&self) -> CodeRequestStatus {
        match self {
            Self::Completed { .. } => CodeRequestStatus::Completed,
            Self::Pending { .. } => CodeRequestStatus::Pending,
            Self::Failed { .. } => CodeRequestStatus::Failed,
        }
    }

    pub fn codes(&self) -> &[String] {
        match self {
            Self::Completed { codes, .. } => codes,
            Self::Failed { partial_codes, .. } => partial_codes,
            Self::Pending { .. } => &[],
        }
    }

    pub fn artifact(&self) -> Option<&str> {
        match self {
            Self::Completed { artifact, .. } => artifact.as_deref(),
            _ => None,
        }
    }
}

pub struct CodeFulfilment {
    code_requests: Arc<dyn CodeRequestRepository>,
    issuer: Arc<dyn CodeIssuer>,
    artifacts: ArtifactStore,
    metrics: Metrics,
    policy: RetryPolicy,
}

impl CodeFulfilment {
    pub fn new(
        code_requests: Arc<dyn CodeRequestRepository>,
        issuer: Arc<dyn CodeIssuer>,
        artifacts: ArtifactStore,
        metrics: Metrics,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            code_requests,
            issuer,
            artifacts,
            metrics,
            policy,
        }
    }

    /// `request.attempts` already counts this attempt.
    pub async fn execute(&self, request: &CodeRequest) -> Result<FulfilmentOutcome, RepositoryError> {
        let outcome = match self.issuer.issue(request.payload()).await {
            Ok(codes) => {
                let artifact = if codes.is_empty() {
                    None
                } else {
                    match self.artifacts.write_codes_pdf(request.order_id, &codes).await {
                        Ok(artifact) => Some(artifact.file_name),
                        Err(e) => {
                            tracing::warn!(
                                code_request_id = request.id,
                                "Artifact rendering failed, codes kept without PDF: {}",
                                e
                            );
                            None
                        }
                    }
                };
                self.code_requests
                    .mark_completed(request.id, &codes, artifact.as_deref())
                    .await?;
                FulfilmentOutcome::Completed { codes, artifact }
            }
            // no credentials: keep waiting for configuration, never exhaust
            Err(e @ CodeIssuerError::NotConfigured) => {
                let delay = self.policy.backoff(request.attempts);
                self.code_requests
                    .reschedule(request.id, &e.to_string(), delay)
                    .await?;
                tracing::warn!(
                    code_request_id = request.id,
                    retry_in_secs = delay.as_secs(),
                    "Code retrieval skipped: {}",
                    e
                );
                FulfilmentOutcome::Pending {
                    error: e.to_string(),
                }
            }
            Err(e) if e.is_retryable() && request.attempts < self.policy.max_attempts => {
                let delay = self.policy.backoff(request.attempts);
                self.code_requests
                    .reschedule(request.id, &e.to_string(), delay)
                    .await?;
                tracing::warn!(
                    code_request_id = request.id,
                    attempts = request.attempts,
                    retry_in_secs = delay.as_secs(),
                    "Code retrieval deferred: {}",
                    e
                );
                FulfilmentOutcome::Pending {
                    error: e.to_string(),
                }
            }
            Err(e) => {
                let partial_codes = e.partial_codes().to_vec();
                self.code_requests
                    .mark_failed(request.id, &e.to_string(), &partial_codes)
                    .await?;
                tracing::error!(
                    code_request_id = request.id,
                    attempts = request.attempts,
                    "Code retrieval failed: {}",
                    e
                );
                FulfilmentOutcome::Failed {
                    error: e.to_string(),
                    partial_codes,
                }
            }
        };

        self.metrics.code_request_outcome(outcome.status().as_str());
        Ok(outcome)
    }
}
