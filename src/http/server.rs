//! HTTP server and RPC dispatcher.
//!
//! # Responsibilities
//! - Create the axum Router and wire up middleware (tracing, request ID)
//! - Parse and validate JSON-RPC payloads
//! - Apply client and sender rate limits, then the response cache
//! - Split a batch per backend group and reassemble responses in input order
//! - Count abandoned requests (client disconnect or deadline) as 499 exactly once
//!
//! # Design Decisions
//! - Outbound calls are awaited inside the handler future, never spawned, so
//!   dropping that future on disconnect cancels every one of them
//! - Only whole-request rate limiting changes the HTTP status

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    response::Response,
    routing::post,
    Router,
};
use futures_util::future::join_all;
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::blockchain::{check_chain_id, decode_raw_transaction, verify_auth_header};
use crate::cache::{self, is_cacheable, RpcCache};
use crate::config::{ConfigError, ProxyConfig};
use crate::http::request::{
    client_identity, forwarded_for_chain, propagate_request_id_layer, request_id,
    set_request_id_layer, ForwardingPolicy, RequestMetadata,
};
use crate::http::response::{client_closed, error_response, rpc_response, RpcBody};
use crate::lifecycle::Shutdown;
use crate::load_balancer::{build_backend_groups, BackendGroup};
use crate::observability::Metrics;
use crate::rpc::{BatchElement, ProxyError, RpcPayload, RpcRequest, RpcResponse};
use crate::security::{MethodAllowList, RateLimiters, RequestLimits, FLASHBOTS_AUTH_HEADER};

/// Records the terminal status of one inbound request. Dropped while still
/// armed, it records a client disconnect.
struct DisconnectGuard {
    metrics: Arc<Metrics>,
    request_id: String,
    armed: bool,
}

impl DisconnectGuard {
    fn new(metrics: Arc<Metrics>, request_id: String) -> Self {
        Self {
            metrics,
            request_id,
            armed: true,
        }
    }

    fn finish(mut self, response: Response) -> Response {
        self.armed = false;
        self.metrics.record_http_response_code(response.status().as_str());
        response
    }

    fn abandon(mut self) -> Response {
        self.armed = false;
        self.metrics.record_http_response_code("499");
        client_closed()
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(request_id = %self.request_id, "Client disconnected before response");
            self.metrics.record_http_response_code("499");
        }
    }
}

/// Calls bound for one group, with their positions in the inbound batch.
struct GroupDispatch {
    group: Arc<BackendGroup>,
    positions: Vec<usize>,
    calls: Vec<RpcRequest>,
}

/// The RPC dispatcher.
pub struct RpcServer {
    groups: HashMap<String, Arc<BackendGroup>>,
    method_mappings: HashMap<String, String>,
    allow_list: MethodAllowList,
    limits: RequestLimits,
    rate_limiters: RateLimiters,
    cache: Box<dyn RpcCache>,
    forwarding: ForwardingPolicy,
    timeout: Duration,
    enable_served_by_header: bool,
    trust_forwarded_for: bool,
    metrics: Arc<Metrics>,
}

impl RpcServer {
    /// Build the dispatcher and every backend it routes to.
    pub fn from_config(config: &ProxyConfig, metrics: Arc<Metrics>) -> Result<Self, ConfigError> {
        let groups = build_backend_groups(config, metrics.clone())?;
        let server = &config.server;
        Ok(Self {
            groups,
            method_mappings: config.rpc_method_mappings.clone(),
            allow_list: MethodAllowList::new(config.rpc_method_mappings.keys().cloned()),
            limits: RequestLimits {
                max_body_size: server.max_body_size_bytes,
                max_batch_size: server.max_batch_size,
            },
            rate_limiters: RateLimiters::from_config(&config.rate_limit, &config.sender_rate_limit),
            cache: cache::from_config(&config.cache),
            forwarding: ForwardingPolicy::from_config(server),
            timeout: Duration::from_secs(server.timeout_secs),
            enable_served_by_header: server.enable_served_by_header,
            trust_forwarded_for: server.trust_forwarded_for,
            metrics,
        })
    }

    pub fn with_cache(mut self, cache: Box<dyn RpcCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Handle one inbound HTTP request.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let guard = DisconnectGuard::new(self.metrics.clone(), request_id(request.headers()));
        match tokio::time::timeout(self.timeout, self.dispatch(request)).await {
            Ok(response) => guard.finish(response),
            Err(_) => {
                tracing::warn!(request_id = %guard.request_id, timeout = ?self.timeout, "Request deadline exceeded");
                guard.abandon()
            }
        }
    }

    async fn dispatch(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let request_id = request_id(&parts.headers);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let client = client_identity(&parts.headers, peer, self.trust_forwarded_for);

        let bytes = match self.read_body(body).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "Failed to read request body");
                return self.reject(Value::Null, e);
            }
        };

        let payload = match RpcPayload::parse(&bytes) {
            Ok(payload) => payload,
            Err(e) => return self.reject(Value::Null, e),
        };
        let is_batch = payload.is_batch();
        let elements = payload.into_elements();
        if is_batch {
            if let Err(e) = self.limits.check_batch_size(elements.len()) {
                return self.reject(Value::Null, e);
            }
        }
        self.metrics.record_batch_size(elements.len());

        let exempt = self.is_exempt(&parts.headers, &bytes);
        if !exempt && !self.rate_limiters.ip.take(&client) {
            tracing::debug!(request_id = %request_id, client = %client, "Client over rate limit");
            self.metrics.record_rate_limited("ip");
            return self.reject(Value::Null, ProxyError::OverRateLimit);
        }

        tracing::debug!(
            request_id = %request_id,
            client = %client,
            calls = elements.len(),
            batch = is_batch,
            "Dispatching RPC request"
        );

        let mut slots: Vec<Option<RpcResponse>> = vec![None; elements.len()];
        let mut pending: HashMap<String, GroupDispatch> = HashMap::new();

        for (position, element) in elements.into_iter().enumerate() {
            let call = match element {
                BatchElement::Call(call) => call,
                BatchElement::Invalid { id, error } => {
                    slots[position] = Some(RpcResponse::error(id, &error));
                    continue;
                }
            };
            self.metrics.record_rpc_request(&call.method);

            let group = match self.admit(&call, exempt) {
                Ok(group) => group,
                Err(e) => {
                    tracing::debug!(request_id = %request_id, method = %call.method, error = %e, "Call rejected");
                    slots[position] = Some(RpcResponse::error(call.id.clone(), &e));
                    continue;
                }
            };

            if is_cacheable(&call.method) {
                let hit = self.cache.get(&call);
                self.metrics.record_cache_lookup(&call.method, hit.is_some());
                if let Some(response) = hit {
                    slots[position] = Some(response);
                    continue;
                }
            }

            let dispatch = pending
                .entry(group.name().to_string())
                .or_insert_with(|| GroupDispatch {
                    group,
                    positions: Vec::new(),
                    calls: Vec::new(),
                });
            dispatch.positions.push(position);
            dispatch.calls.push(call);
        }

        let metadata = RequestMetadata::from_request(
            &parts.uri,
            &parts.headers,
            &self.forwarding,
            forwarded_for_chain(&parts.headers, peer).as_deref(),
        );

        let outcomes = join_all(pending.into_values().map(|dispatch| {
            let metadata = &metadata;
            async move {
                let out = dispatch.group.forward(&dispatch.calls, metadata).await;
                (dispatch, out)
            }
        }))
        .await;

        let mut served_by = Vec::new();
        for (dispatch, out) in outcomes {
            for ((position, call), response) in dispatch.positions.into_iter().zip(&dispatch.calls).zip(out.responses) {
                if !response.is_error() {
                    self.cache.put(call, &response);
                }
                slots[position] = Some(response);
            }
            served_by.extend(out.served_by);
        }
        served_by.sort();

        let responses: Vec<RpcResponse> = slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    RpcResponse::error(Value::Null, &ProxyError::Internal("missing response".into()))
                })
            })
            .collect();
        for response in &responses {
            if let Some(error) = &response.error {
                self.metrics.record_rpc_error(error.code);
            }
        }

        let body = if is_batch {
            RpcBody::Batch(responses)
        } else {
            match responses.into_iter().next() {
                Some(single) => RpcBody::Single(single),
                None => return self.reject(Value::Null, ProxyError::Internal("empty response".into())),
            }
        };

        tracing::debug!(
            request_id = %request_id,
            duration_ms = start.elapsed().as_millis() as u64,
            served_by = ?served_by,
            "RPC request completed"
        );

        let served_by = (self.enable_served_by_header && !served_by.is_empty()).then(|| served_by.join(", "));
        rpc_response(&body, served_by.as_deref())
    }

    /// Read the body, stopping as soon as it passes the size limit.
    async fn read_body(&self, body: Body) -> Result<Vec<u8>, ProxyError> {
        let mut stream = body.into_data_stream();
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProxyError::Internal(format!("failed to read request body: {}", e)))?;
            self.limits.check_body_size(bytes.len() + chunk.len())?;
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    /// Per-call checks. Returns the group the call is routed to.
    fn admit(&self, call: &RpcRequest, exempt: bool) -> Result<Arc<BackendGroup>, ProxyError> {
        call.validate()?;
        self.allow_list.check(&call.method)?;
        let group = self
            .method_mappings
            .get(&call.method)
            .and_then(|name| self.groups.get(name))
            .cloned()
            .ok_or(ProxyError::MethodNotWhitelisted)?;

        if !exempt && self.rate_limiters.applies_to_sender(&call.method) {
            let info = decode_raw_transaction(&call.params)
                .and_then(|info| check_chain_id(&info, self.rate_limiters.allowed_chain_ids()).map(|_| info))
                .map_err(|e| ProxyError::InvalidParams(e.to_string()))?;
            if !self.rate_limiters.sender.take(&info.rate_limit_key()) {
                self.metrics.record_rate_limited("sender");
                return Err(ProxyError::OverSenderRateLimit);
            }
        }
        Ok(group)
    }

    /// A valid inbound signature from an exempt signer bypasses rate limits.
    fn is_exempt(&self, headers: &HeaderMap, body: &[u8]) -> bool {
        let Some(header) = headers.get(FLASHBOTS_AUTH_HEADER).and_then(|v| v.to_str().ok()) else {
            return false;
        };
        match verify_auth_header(header, body) {
            Ok(signer) => self.rate_limiters.is_exempt(&signer),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring invalid auth header");
                false
            }
        }
    }

    fn reject(&self, id: Value, error: ProxyError) -> Response {
        self.metrics.record_rpc_error(error.code());
        error_response(id, &error)
    }
}

async fn rpc_handler(State(server): State<Arc<RpcServer>>, request: Request<Body>) -> Response {
    server.handle(request).await
}

/// The axum router serving RPC on every path.
pub fn router(server: Arc<RpcServer>) -> Router {
    Router::new()
        .route("/", post(rpc_handler))
        .route("/{*path}", post(rpc_handler))
        .with_state(server)
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}

/// HTTP server for the RPC proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ProxyConfig, metrics: Arc<Metrics>) -> Result<Self, ConfigError> {
        let server = Arc::new(RpcServer::from_config(config, metrics)?);
        Ok(Self {
            router: router(server),
        })
    }

    /// Serve on `listener` until `shutdown` fires, then drain.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
