//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream RPC node
//! - Build, sign and send one upstream request per attempt
//! - Correlate upstream responses to the calls that were sent
//! - Retry failed attempts with backoff before giving up
//! - Track passive health (consecutive failures)

use reqwest::Client;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::blockchain::{AuthSigner, ChainError};
use crate::config::loader::resolve_secret;
use crate::config::{BackendConfig, BackendDefaults, ConfigError};
use crate::http::request::RequestMetadata;
use crate::load_balancer::transport::LimitedClient;
use crate::load_balancer::url::build_backend_url;
use crate::observability::Metrics;
use crate::resilience::Backoff;
use crate::rpc::types::parse_responses;
use crate::rpc::{RpcRequest, RpcResponse};
use crate::security::HeaderProvider;

/// Failure of one backend. The group treats every variant as a member failure.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("too many requests for backend {0}")]
    TooManyRequests(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(u16),

    #[error("backend response too large")]
    ResponseTooLarge,

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("failed to sign request: {0}")]
    Signing(#[from] ChainError),
}

impl BackendError {
    fn outcome(&self) -> &'static str {
        match self {
            BackendError::TooManyRequests(_) => "too_many_requests",
            BackendError::Http(e) if e.is_timeout() => "timeout",
            BackendError::Status(_) => "bad_status",
            BackendError::ResponseTooLarge | BackendError::InvalidResponse(_) => "bad_response",
            _ => "error",
        }
    }

    /// Whether another attempt against the same backend may succeed.
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            BackendError::TooManyRequests(_) | BackendError::Signing(_) | BackendError::Encode(_)
        )
    }
}

/// A single upstream RPC node.
#[derive(Debug)]
pub struct Backend {
    name: String,
    rpc_url: String,
    client: LimitedClient,
    headers: HeaderProvider,
    augmented_methods: Arc<HashSet<String>>,
    response_timeout: Duration,
    max_response_size: usize,
    max_retries: u32,
    backoff: Backoff,
    unhealthy_threshold: usize,
    consecutive_failures: AtomicUsize,
    metrics: Arc<Metrics>,
}

impl Backend {
    /// A backend with default settings, no signer and no augmented methods.
    pub fn new(
        name: impl Into<String>,
        rpc_url: impl Into<String>,
        client: LimitedClient,
        metrics: Arc<Metrics>,
    ) -> Self {
        let defaults = BackendDefaults::default();
        Self {
            name: name.into(),
            rpc_url: rpc_url.into(),
            client,
            headers: HeaderProvider::default(),
            augmented_methods: Arc::new(HashSet::new()),
            response_timeout: Duration::from_secs(defaults.response_timeout_secs),
            max_response_size: defaults.max_response_size_bytes,
            max_retries: defaults.max_retries,
            backoff: Backoff::new(defaults.retry_base_delay_ms, defaults.retry_max_delay_ms),
            unhealthy_threshold: defaults.unhealthy_threshold,
            consecutive_failures: AtomicUsize::new(0),
            metrics,
        }
    }

    /// Build a backend from its config entry.
    pub fn from_config(
        config: &BackendConfig,
        defaults: &BackendDefaults,
        augmented_methods: Arc<HashSet<String>>,
        http: Client,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ConfigError> {
        let signer = match &config.auth_signing_key {
            Some(key) => {
                let key = resolve_secret(key)?;
                let signer = AuthSigner::from_private_key(&key).map_err(|e| ConfigError::Backend {
                    name: config.name.clone(),
                    reason: e.to_string(),
                })?;
                Some(signer)
            }
            None => None,
        };

        let client = LimitedClient::new(http, config.max_concurrent_rpcs, &config.name, metrics.clone());
        Ok(Self::new(&config.name, &config.rpc_url, client, metrics)
            .with_defaults(defaults)
            .with_max_retries(config.max_retries.unwrap_or(defaults.max_retries))
            .with_header_provider(HeaderProvider::new(signer))
            .with_augmented_methods(augmented_methods))
    }

    pub fn with_defaults(mut self, defaults: &BackendDefaults) -> Self {
        self.response_timeout = Duration::from_secs(defaults.response_timeout_secs);
        self.max_response_size = defaults.max_response_size_bytes;
        self.max_retries = defaults.max_retries;
        self.backoff = Backoff::new(defaults.retry_base_delay_ms, defaults.retry_max_delay_ms);
        self.unhealthy_threshold = defaults.unhealthy_threshold.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_header_provider(mut self, headers: HeaderProvider) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_augmented_methods(mut self, methods: Arc<HashSet<String>>) -> Self {
        self.augmented_methods = methods;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // --- Health Logic ---

    /// Healthy until `unhealthy_threshold` consecutive failures are seen.
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) < self.unhealthy_threshold
    }

    pub fn mark_success(&self) {
        let previous = self.consecutive_failures.swap(0, Ordering::Relaxed);
        if previous >= self.unhealthy_threshold {
            tracing::info!(backend = %self.name, "Backend recovered");
        }
    }

    pub fn mark_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures == self.unhealthy_threshold {
            tracing::warn!(backend = %self.name, failures, "Backend marked unhealthy");
        }
    }

    /// Send `batch` to this backend.
    ///
    /// The returned responses line up with `batch` by position, matched by id.
    pub async fn forward(
        &self,
        batch: &[RpcRequest],
        metadata: &RequestMetadata,
    ) -> Result<Vec<RpcResponse>, BackendError> {
        let body = match batch {
            [single] => serde_json::to_vec(single),
            _ => serde_json::to_vec(batch),
        }
        .map_err(|e| BackendError::Encode(e.to_string()))?;
        let url = build_backend_url(&self.rpc_url, batch, metadata, &self.augmented_methods);

        let mut attempt = 0;
        loop {
            let result = self.attempt(&url, &body, batch, metadata).await;
            match result {
                Ok(responses) => {
                    self.mark_success();
                    return Ok(responses);
                }
                Err(e) => {
                    if !matches!(e, BackendError::TooManyRequests(_)) {
                        self.mark_failure();
                    }
                    if !e.is_retryable() || attempt >= self.max_retries {
                        return Err(e);
                    }
                    attempt += 1;
                    let delay = self.backoff.delay(attempt);
                    tracing::info!(backend = %self.name, attempt, delay = ?delay, error = %e, "Retrying backend request");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        body: &[u8],
        batch: &[RpcRequest],
        metadata: &RequestMetadata,
    ) -> Result<Vec<RpcResponse>, BackendError> {
        // Signed per attempt, over exactly the bytes sent.
        let headers = self.headers.outbound_headers(body, metadata)?;
        let request = self
            .client
            .client()
            .post(url)
            .headers(headers)
            .body(body.to_vec())
            .timeout(self.response_timeout)
            .build()?;

        let start = Instant::now();
        let result = self.send(request, batch).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        self.metrics.record_backend_request(&self.name, outcome, start.elapsed());
        result
    }

    async fn send(&self, request: reqwest::Request, batch: &[RpcRequest]) -> Result<Vec<RpcResponse>, BackendError> {
        let mut response = self.client.do_limited(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        if response.content_length().is_some_and(|len| len as usize > self.max_response_size) {
            return Err(BackendError::ResponseTooLarge);
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > self.max_response_size {
                return Err(BackendError::ResponseTooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }

        let responses = parse_responses(&bytes).map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        correlate(batch, responses)
    }
}

/// Match responses to requests by id. Duplicate ids are matched in order.
fn correlate(batch: &[RpcRequest], responses: Vec<RpcResponse>) -> Result<Vec<RpcResponse>, BackendError> {
    if responses.len() != batch.len() {
        return Err(BackendError::InvalidResponse(format!(
            "expected {} responses, got {}",
            batch.len(),
            responses.len()
        )));
    }

    let mut by_id: HashMap<String, VecDeque<RpcResponse>> = HashMap::new();
    for response in responses {
        by_id.entry(id_key(&response.id)).or_default().push_back(response);
    }

    batch
        .iter()
        .map(|req| {
            by_id
                .get_mut(&id_key(&req.id))
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| BackendError::InvalidResponse(format!("missing response for id {}", req.id)))
        })
        .collect()
}

pub(crate) fn id_key(id: &Value) -> String {
    id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend(threshold: usize) -> Backend {
        let metrics = Arc::new(Metrics::new());
        let client = LimitedClient::new(Client::new(), None, "node", metrics.clone());
        Backend::new("node", "http://127.0.0.1:1", client, metrics).with_defaults(&BackendDefaults {
            unhealthy_threshold: threshold,
            ..Default::default()
        })
    }

    #[test]
    fn test_health_transitions() {
        let b = backend(2);
        assert!(b.is_healthy());
        b.mark_failure();
        assert!(b.is_healthy());
        b.mark_failure();
        assert!(!b.is_healthy());
        b.mark_success();
        assert!(b.is_healthy());
    }

    #[test]
    fn test_correlate_reorders_by_id() {
        let batch = vec![
            RpcRequest::new(1, "eth_chainId", Value::Null),
            RpcRequest::new("a", "net_version", Value::Null),
        ];
        let responses = vec![
            RpcResponse::success(json!("a"), json!("1")),
            RpcResponse::success(json!(1), json!("0x1")),
        ];
        let out = correlate(&batch, responses).unwrap();
        assert_eq!(out[0].result, json!("0x1"));
        assert_eq!(out[1].result, json!("1"));
    }

    #[test]
    fn test_correlate_duplicate_ids_in_order() {
        let batch = vec![
            RpcRequest::new(1, "eth_chainId", Value::Null),
            RpcRequest::new(1, "net_version", Value::Null),
        ];
        let responses = vec![
            RpcResponse::success(json!(1), json!("first")),
            RpcResponse::success(json!(1), json!("second")),
        ];
        let out = correlate(&batch, responses).unwrap();
        assert_eq!(out[0].result, json!("first"));
        assert_eq!(out[1].result, json!("second"));
    }

    #[test]
    fn test_correlate_rejects_mismatch() {
        let batch = vec![RpcRequest::new(1, "eth_chainId", Value::Null)];
        assert!(correlate(&batch, vec![]).is_err());
        let wrong_id = vec![RpcResponse::success(json!(2), json!("0x1"))];
        assert!(matches!(correlate(&batch, wrong_id), Err(BackendError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails_and_counts() {
        let b = backend(1);
        let batch = vec![RpcRequest::new(1, "eth_chainId", Value::Null)];
        let err = b.forward(&batch, &RequestMetadata::default()).await.unwrap_err();
        assert!(matches!(err, BackendError::Http(_)));
        assert!(!b.is_healthy());
    }
}
