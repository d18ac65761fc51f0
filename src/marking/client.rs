use super::signer::{RequestSigner, SignerError};
use crate::domain::CodeRequestPayload;
use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeIssuerError {
    #[error("marking API unavailable: {0}")]
    Unavailable(String),
    #[error("marking API rejected the request ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        partial: Vec<String>,
    },
    #[error("request signing failed: {0}")]
    Signing(#[from] SignerError),
    #[error("Circuit breaker open - marking API unavailable")]
    CircuitBreakerOpen,
    #[error("marking API credentials are not configured")]
    NotConfigured,
}

impl CodeIssuerError {
    /// Whether the same request may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::CircuitBreakerOpen | Self::NotConfigured
        )
    }

    pub fn partial_codes(&self) -> &[String] {
        match self {
            Self::Rejected { partial, .. } => partial,
            _ => &[],
        }
    }
}

/// Source of marking codes.
#[async_trait]
pub trait CodeIssuer: Send + Sync {
    async fn issue(&self, payload: &CodeRequestPayload) -> Result<Vec<String>, CodeIssuerError>;
}

#[derive(Debug, Default, Deserialize)]
struct IssueResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    kizs: Vec<String>,
}

/// HTTP client for the marking-code API.
#[derive(Clone)]
pub struct MarkingClient {
    client: Client,
    base_url: String,
    signer: RequestSigner,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>,
}

impl MarkingClient {
    pub fn new(base_url: String, signer: RequestSigner, timeout: Duration) -> Self {
        Self::with_circuit_breaker_config(base_url, signer, timeout, 5, Duration::from_secs(60))
    }

    pub fn with_circuit_breaker_config(
        base_url: String,
        signer: RequestSigner,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::exponential(Duration::from_secs(10), reset_timeout);
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
            circuit_breaker,
        }
    }

    async fn send(&self, body: Vec<u8>) -> Result<Vec<String>, CodeIssuerError> {
        let signature = self.signer.signature_header(&body)?;
        let url = format!("{}/kizs", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("X-Signature", signature)
            .header("X-Certificate", self.signer.certificate_header())
            .body(body)
            .send()
            .await
            .map_err(|e| CodeIssuerError::Unavailable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CodeIssuerError::Unavailable(e.to_string()))?;
        let parsed: Option<IssueResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let parsed = parsed.unwrap_or_default();
            return Err(CodeIssuerError::Rejected {
                status: status.as_u16(),
                message: parsed
                    .message
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
                partial: parsed.kizs,
            });
        }

        let parsed = parsed.ok_or_else(|| CodeIssuerError::Rejected {
            status: status.as_u16(),
            message: "response body is not valid JSON".to_string(),
            partial: Vec::new(),
        })?;

        if parsed.status.as_deref() == Some("error") {
            return Err(CodeIssuerError::Rejected {
                status: status.as_u16(),
                message: parsed.message.unwrap_or_else(|| "error".to_string()),
                partial: parsed.kizs,
            });
        }

        Ok(parsed.kizs)
    }
}

#[async_trait]
impl CodeIssuer for MarkingClient {
    async fn issue(&self, payload: &CodeRequestPayload) -> Result<Vec<String>, CodeIssuerError> {
        let body = payload
            .to_canonical_bytes()
            .map_err(|e| CodeIssuerError::Rejected {
                status: 0,
                message: format!("payload serialization failed: {}", e),
                partial: Vec::new(),
            })?;

        // Only transport failures count against the breaker; a rejection
        // means the API is up.
        let result = self
            .circuit_breaker
            .call_with(
                |e: &CodeIssuerError| matches!(e, CodeIssuerError::Unavailable(_)),
                self.send(body),
            )
            .await;

        match result {
            Ok(codes) => {
                tracing::info!(count = codes.len(), inn = %payload.inn, "Marking codes issued");
                Ok(codes)
            }
            Err(FailsafeError::Rejected) => Err(CodeIssuerError::CircuitBreakerOpen),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

/// Stand-in used when no key or certificate is configured. Every call fails
/// as retryable so requests stay pending until credentials appear.
pub struct UnconfiguredIssuer;

#[async_trait]
impl CodeIssuer for UnconfiguredIssuer {
    async fn issue(&self, _payload: &CodeRequestPayload) -> Result<Vec<String>, CodeIssuerError> {
        Err(CodeIssuerError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GtinQuantity;
    use crate::marking::signer::test_support::key_and_certificate;
    use mockito::Matcher;

    fn payload() -> CodeRequestPayload {
        CodeRequestPayload {
            gtin_data: vec![GtinQuantity {
                gtin: "04602380040001".to_string(),
                count: 2,
            }],
            inn: "7707083893".to_string(),
        }
    }

    fn client(url: String) -> MarkingClient {
        let (_, key_pem, cert_pem) = key_and_certificate();
        let signer = RequestSigner::from_pem(&key_pem, &cert_pem).unwrap();
        MarkingClient::new(url, signer, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_issue_posts_signed_canonical_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/kizs")
            .match_header("x-signature", Matcher::Regex("^[A-Za-z0-9+/=]+$".into()))
            .match_header("x-certificate", "MAMCAQE=")
            .match_body(Matcher::Exact(
                r#"{"gtin_data":[{"gtin":"04602380040001","count":2}],"inn":"7707083893"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"success","message":"ok","kizs":["010460238004000121abc","010460238004000121def"]}"#)
            .create_async()
            .await;

        let codes = client(server.url()).issue(&payload()).await.unwrap();

        assert_eq!(codes, vec!["010460238004000121abc", "010460238004000121def"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected_with_partial_codes() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/kizs")
            .with_status(422)
            .with_body(r#"{"status":"error","message":"limit exceeded","kizs":["partial-1"]}"#)
            .create_async()
            .await;

        let err = client(server.url()).issue(&payload()).await.unwrap_err();

        match &err {
            CodeIssuerError::Rejected { status, message, .. } => {
                assert_eq!(*status, 422);
                assert_eq!(message, "limit exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.partial_codes(), ["partial-1".to_string()]);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_error_status_in_body_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/kizs")
            .with_status(200)
            .with_body(r#"{"status":"error","message":"bad inn"}"#)
            .create_async()
            .await;

        let err = client(server.url()).issue(&payload()).await.unwrap_err();
        assert!(matches!(err, CodeIssuerError::Rejected { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_transport_failure_is_retryable() {
        // nothing listens on port 9 locally
        let err = client("http://127.0.0.1:9".to_string())
            .issue(&payload())
            .await
            .unwrap_err();

        assert!(matches!(err, CodeIssuerError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_breaker_opens_after_consecutive_transport_failures() {
        let (_, key_pem, cert_pem) = key_and_certificate();
        let signer = RequestSigner::from_pem(&key_pem, &cert_pem).unwrap();
        let client = MarkingClient::with_circuit_breaker_config(
            "http://127.0.0.1:9".to_string(),
            signer,
            Duration::from_secs(1),
            2,
            Duration::from_secs(60),
        );

        let _ = client.issue(&payload()).await;
        let _ = client.issue(&payload()).await;
        let err = client.issue(&payload()).await.unwrap_err();

        assert!(matches!(err, CodeIssuerError::CircuitBreakerOpen));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unconfigured_issuer_is_retryable() {
        let err = UnconfiguredIssuer.issue(&payload()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
