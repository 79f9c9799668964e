//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for the RPC proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Inbound server settings (bind address, limits, forwarding).
    pub server: ServerConfig,

    /// Defaults applied to every backend.
    pub backend: BackendDefaults,

    /// Upstream RPC node definitions.
    pub backends: Vec<BackendConfig>,

    /// Named sets of backends serving the same methods.
    pub backend_groups: Vec<BackendGroupConfig>,

    /// RPC method → backend group. The keys double as the method allow-list.
    pub rpc_method_mappings: HashMap<String, String>,

    /// Per-client-IP rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Per-transaction-sender rate limiting.
    pub sender_rate_limit: SenderRateLimitConfig,

    /// Response caching for immutable methods.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Inbound server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8545").
    pub bind_address: String,

    /// Maximum inbound body size in bytes.
    pub max_body_size_bytes: usize,

    /// Maximum number of calls in one inbound batch.
    pub max_batch_size: usize,

    /// Maximum number of calls sent to a backend in one upstream request.
    pub max_upstream_batch_size: usize,

    /// Deadline for producing a response, in seconds.
    pub timeout_secs: u64,

    /// Attach `X-Served-By` to responses.
    pub enable_served_by_header: bool,

    /// Inbound header names copied onto outbound backend requests.
    pub forward_headers: Vec<String>,

    /// Also forward the original path and query as `X-Original-Path`/`X-Original-Query`.
    pub forward_original_uri_headers: bool,

    /// Methods whose outbound URL carries the inbound path and query.
    pub url_augmented_methods: Vec<String>,

    /// Use the first `X-Forwarded-For` token as the client identity.
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8545".to_string(),
            max_body_size_bytes: 10 * 1024 * 1024,
            max_batch_size: 100,
            max_upstream_batch_size: 10,
            timeout_secs: 30,
            enable_served_by_header: false,
            forward_headers: Vec::new(),
            forward_original_uri_headers: false,
            url_augmented_methods: vec!["eth_sendRawTransaction".to_string()],
            trust_forwarded_for: true,
        }
    }
}

/// Settings shared by all backends unless overridden.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendDefaults {
    /// Per-attempt upstream timeout in seconds.
    pub response_timeout_secs: u64,

    /// Maximum upstream response size in bytes.
    pub max_response_size_bytes: usize,

    /// Retries against the same backend before failing over.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Consecutive failures before a backend is considered unhealthy.
    pub unhealthy_threshold: usize,
}

impl Default for BackendDefaults {
    fn default() -> Self {
        Self {
            response_timeout_secs: 5,
            max_response_size_bytes: 10 * 1024 * 1024,
            max_retries: 0,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2000,
            unhealthy_threshold: 3,
        }
    }
}

/// Upstream RPC node configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier.
    pub name: String,

    /// Base URL of the node (e.g., "http://127.0.0.1:8545").
    pub rpc_url: String,

    /// Maximum in-flight requests to this backend. Absent means unbounded.
    #[serde(default)]
    pub max_concurrent_rpcs: Option<usize>,

    /// Hex private key used to sign outbound bodies. `$NAME` reads the
    /// environment variable `NAME`.
    #[serde(default)]
    pub auth_signing_key: Option<String>,

    /// Overrides `backend.max_retries`.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Selection policy across the members of a group.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Static configuration order.
    #[default]
    Priority,
    /// Rotate the starting member per request.
    RoundRobin,
    /// Healthy members first; unhealthy ones only if nothing else is left.
    HealthAware,
}

/// Backend group configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendGroupConfig {
    /// Group name referenced by `rpc_method_mappings`.
    pub name: String,

    /// Ordered member backend names.
    pub backends: Vec<String>,

    /// Member selection policy.
    #[serde(default)]
    pub strategy: StrategyKind,
}

/// Per-client-IP rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per second per IP.
    pub requests_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,

    /// Signers whose valid auth header bypasses rate limiting.
    pub exempt_signers: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 100,
            burst_size: 50,
            exempt_signers: Vec::new(),
        }
    }
}

/// Per-sender rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SenderRateLimitConfig {
    /// Enable sender rate limiting.
    pub enabled: bool,

    /// Maximum transactions per second per sender and nonce.
    pub requests_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,

    /// Accepted chain IDs. Empty accepts any.
    pub allowed_chain_ids: Vec<u64>,

    /// Methods whose first param is a signed raw transaction.
    pub methods: Vec<String>,
}

impl Default for SenderRateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 1,
            burst_size: 1,
            allowed_chain_ids: Vec::new(),
            methods: vec!["eth_sendRawTransaction".to_string()],
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching.
    pub enabled: bool,

    /// Entry lifetime in seconds.
    pub ttl_secs: u64,

    /// Maximum number of cached entries.
    pub max_entries: usize,

    /// Chain context mixed into cache keys.
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 300,
            max_entries: 10_000,
            namespace: "default".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [[backends]]
            name = "node"
            rpc_url = "http://127.0.0.1:8545"
            max_concurrent_rpcs = 4

            [[backend_groups]]
            name = "main"
            backends = ["node"]
            strategy = "round_robin"

            [rpc_method_mappings]
            eth_chainId = "main"
            "#,
        )
        .unwrap();

        assert_eq!(config.backends[0].max_concurrent_rpcs, Some(4));
        assert_eq!(config.backend_groups[0].strategy, StrategyKind::RoundRobin);
        assert_eq!(config.rpc_method_mappings["eth_chainId"], "main");
        assert_eq!(config.server.max_batch_size, 100);
        assert_eq!(config.server.url_augmented_methods, vec!["eth_sendRawTransaction"]);
    }

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert!(!config.rate_limit.enabled);
        assert!(!config.cache.enabled);
        assert_eq!(config.backend.max_retries, 0);
        assert_eq!(config.sender_rate_limit.methods, vec!["eth_sendRawTransaction"]);
    }
}
