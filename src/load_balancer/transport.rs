//! Concurrency-limited outbound HTTP.
//!
//! # Responsibilities
//! - Bound in-flight requests per backend with an optional semaphore
//! - Give up with `TooManyRequests` when the request's timeout passes while waiting
//! - Release the slot on every exit path (RAII permit)
//!
//! Time spent waiting for a slot is deducted from the request's timeout.

use reqwest::{Client, Request, Response};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::load_balancer::backend::BackendError;
use crate::observability::Metrics;

/// HTTP client gated by a per-backend admission semaphore.
#[derive(Debug, Clone)]
pub struct LimitedClient {
    client: Client,
    gate: Option<Arc<Semaphore>>,
    backend_name: String,
    metrics: Arc<Metrics>,
}

impl LimitedClient {
    /// `max_concurrent = None` leaves the client unbounded.
    pub fn new(
        client: Client,
        max_concurrent: Option<usize>,
        backend_name: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let gate = max_concurrent.map(|n| Arc::new(Semaphore::new(n)));
        Self::with_gate(client, gate, backend_name, metrics)
    }

    pub fn with_gate(
        client: Client,
        gate: Option<Arc<Semaphore>>,
        backend_name: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            gate,
            backend_name: backend_name.into(),
            metrics,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Execute `request` once a slot is free.
    ///
    /// No HTTP call is made when the slot cannot be acquired in time.
    pub async fn do_limited(&self, mut request: Request) -> Result<Response, BackendError> {
        let _permit = match &self.gate {
            None => None,
            Some(gate) => {
                let started = Instant::now();
                let acquire = gate.clone().acquire_owned();
                let acquired = match request.timeout().copied() {
                    Some(deadline) => tokio::time::timeout(deadline, acquire).await.ok(),
                    None => Some(acquire.await),
                };
                let Some(Ok(permit)) = acquired else {
                    self.metrics.record_too_many_requests(&self.backend_name);
                    tracing::debug!(backend = %self.backend_name, "Admission gate exhausted");
                    return Err(BackendError::TooManyRequests(self.backend_name.clone()));
                };
                if let Some(timeout) = request.timeout_mut().as_mut() {
                    *timeout = timeout.saturating_sub(started.elapsed());
                }
                Some(permit)
            }
        };

        self.client.execute(request).await.map_err(BackendError::Http)
    }
}
