//! Backend groups and failover.
//!
//! A group splits its share of a batch into upstream chunks, then sends each
//! chunk to members in the order chosen by its strategy until one succeeds.
//! Chunks are awaited in place so dropping the dispatch cancels them all.

use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::{ConfigError, ProxyConfig, StrategyKind};
use crate::http::request::RequestMetadata;
use crate::load_balancer::backend::Backend;
use crate::load_balancer::strategy::{strategy_for, SelectionStrategy};
use crate::observability::Metrics;
use crate::rpc::{ProxyError, RpcRequest, RpcResponse};

/// Result of dispatching one sub-batch to a group.
#[derive(Debug, Default)]
pub struct GroupResponse {
    /// One response per input call, in input order.
    pub responses: Vec<RpcResponse>,
    /// `"<group>/<backend>"` for every chunk that was served, deduplicated.
    pub served_by: Vec<String>,
}

/// A named set of interchangeable backends.
#[derive(Debug)]
pub struct BackendGroup {
    name: String,
    backends: Vec<Arc<Backend>>,
    strategy: Box<dyn SelectionStrategy>,
    max_upstream_batch_size: usize,
}

impl BackendGroup {
    pub fn new(name: impl Into<String>, backends: Vec<Arc<Backend>>, strategy: StrategyKind) -> Self {
        Self {
            name: name.into(),
            backends,
            strategy: strategy_for(strategy),
            max_upstream_batch_size: usize::MAX,
        }
    }

    pub fn with_max_upstream_batch_size(mut self, size: usize) -> Self {
        self.max_upstream_batch_size = size.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Forward `batch`. Calls whose chunk exhausted every member get a
    /// `BackendUnavailable` error response.
    pub async fn forward(&self, batch: &[RpcRequest], metadata: &RequestMetadata) -> GroupResponse {
        let chunks = batch.chunks(self.max_upstream_batch_size);
        let results = join_all(chunks.map(|chunk| self.forward_chunk(chunk, metadata))).await;

        let mut out = GroupResponse::default();
        for (chunk, result) in batch.chunks(self.max_upstream_batch_size).zip(results) {
            match result {
                Ok((responses, backend)) => {
                    let marker = format!("{}/{}", self.name, backend);
                    if !out.served_by.contains(&marker) {
                        out.served_by.push(marker);
                    }
                    out.responses.extend(responses);
                }
                Err(e) => out
                    .responses
                    .extend(chunk.iter().map(|req| RpcResponse::error(req.id.clone(), &e))),
            }
        }
        out
    }

    async fn forward_chunk(
        &self,
        chunk: &[RpcRequest],
        metadata: &RequestMetadata,
    ) -> Result<(Vec<RpcResponse>, String), ProxyError> {
        for backend in self.strategy.select_order(&self.backends) {
            match backend.forward(chunk, metadata).await {
                Ok(responses) => return Ok((responses, backend.name().to_string())),
                Err(e) => {
                    tracing::warn!(
                        group = %self.name,
                        backend = %backend.name(),
                        error = %e,
                        "Backend failed, trying next member"
                    );
                }
            }
        }
        tracing::error!(group = %self.name, calls = chunk.len(), "All backends failed");
        Err(ProxyError::BackendUnavailable)
    }
}

/// Build every group named in `config`, sharing one HTTP client.
pub fn build_backend_groups(
    config: &ProxyConfig,
    metrics: Arc<Metrics>,
) -> Result<HashMap<String, Arc<BackendGroup>>, ConfigError> {
    let http = reqwest::Client::builder().build().map_err(|e| ConfigError::Backend {
        name: "*".to_string(),
        reason: format!("failed to build HTTP client: {}", e),
    })?;
    let augmented: Arc<HashSet<String>> = Arc::new(config.server.url_augmented_methods.iter().cloned().collect());

    let mut backends = HashMap::new();
    for backend_config in &config.backends {
        let backend = Backend::from_config(
            backend_config,
            &config.backend,
            augmented.clone(),
            http.clone(),
            metrics.clone(),
        )?;
        tracing::info!(
            backend = %backend_config.name,
            url = %backend_config.rpc_url,
            max_concurrent_rpcs = ?backend_config.max_concurrent_rpcs,
            signs = backend_config.auth_signing_key.is_some(),
            "Backend configured"
        );
        backends.insert(backend_config.name.clone(), Arc::new(backend));
    }

    let mut groups = HashMap::new();
    for group_config in &config.backend_groups {
        let members = group_config
            .backends
            .iter()
            .map(|name| {
                backends.get(name).cloned().ok_or_else(|| ConfigError::Backend {
                    name: name.clone(),
                    reason: format!("unknown backend in group '{}'", group_config.name),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let group = BackendGroup::new(&group_config.name, members, group_config.strategy)
            .with_max_upstream_batch_size(config.server.max_upstream_batch_size);
        groups.insert(group_config.name.clone(), Arc::new(group));
    }
    Ok(groups)
}
