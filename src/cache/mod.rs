//! Response cache for immutable RPC methods.
//!
//! Keys are `"<namespace>:<method>:<params>"`. Only successful, non-null
//! results are stored; errors and `null` (e.g. an unknown receipt) always go
//! upstream.

use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::rpc::{RpcRequest, RpcResponse};

/// Methods whose results never change once they exist.
const CACHEABLE_METHODS: &[&str] = &[
    "eth_chainId",
    "net_version",
    "eth_getBlockByHash",
    "eth_getTransactionByHash",
    "eth_getTransactionReceipt",
    "eth_getBlockTransactionCountByHash",
];

pub fn is_cacheable(method: &str) -> bool {
    CACHEABLE_METHODS.contains(&method)
}

pub trait RpcCache: Send + Sync {
    /// Cached result for `request`, re-addressed to the request's id.
    fn get(&self, request: &RpcRequest) -> Option<RpcResponse>;

    fn put(&self, request: &RpcRequest, response: &RpcResponse);
}

/// Cache used when caching is disabled: always misses, never stores.
#[derive(Debug, Default)]
pub struct NoopRpcCache;

impl RpcCache for NoopRpcCache {
    fn get(&self, _request: &RpcRequest) -> Option<RpcResponse> {
        None
    }

    fn put(&self, _request: &RpcRequest, _response: &RpcResponse) {}
}

#[derive(Debug)]
struct Entry {
    result: Value,
    inserted: Instant,
}

/// In-process TTL cache bounded by entry count.
#[derive(Debug)]
pub struct MemoryRpcCache {
    entries: DashMap<String, Entry>,
    namespace: String,
    ttl: Duration,
    max_entries: usize,
}

impl MemoryRpcCache {
    pub fn new(namespace: impl Into<String>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            namespace: namespace.into(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(&self, request: &RpcRequest) -> String {
        format!("{}:{}:{}", self.namespace, request.method, request.params)
    }

    fn make_room(&self) {
        self.entries.retain(|_, entry| entry.inserted.elapsed() < self.ttl);
        if self.entries.len() < self.max_entries {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl RpcCache for MemoryRpcCache {
    fn get(&self, request: &RpcRequest) -> Option<RpcResponse> {
        if !is_cacheable(&request.method) {
            return None;
        }
        let key = self.key(request);
        let result = {
            let entry = self.entries.get(&key)?;
            if entry.inserted.elapsed() < self.ttl {
                Some(entry.result.clone())
            } else {
                None
            }
        };
        match result {
            Some(result) => Some(RpcResponse::success(request.id.clone(), result)),
            None => {
                self.entries.remove(&key);
                None
            }
        }
    }

    fn put(&self, request: &RpcRequest, response: &RpcResponse) {
        if !is_cacheable(&request.method) || response.is_error() || response.result.is_null() {
            return;
        }
        let key = self.key(request);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.make_room();
        }
        self.entries.insert(
            key,
            Entry {
                result: response.result.clone(),
                inserted: Instant::now(),
            },
        );
    }
}

/// The cache selected by `config`.
pub fn from_config(config: &CacheConfig) -> Box<dyn RpcCache> {
    if config.enabled {
        Box::new(MemoryRpcCache::new(
            &config.namespace,
            Duration::from_secs(config.ttl_secs),
            config.max_entries,
        ))
    } else {
        Box::new(NoopRpcCache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::ProxyError;
    use serde_json::json;

    fn req(id: u64, method: &str, params: Value) -> RpcRequest {
        RpcRequest::new(id, method, params)
    }

    #[test]
    fn test_noop_always_misses() {
        let cache = NoopRpcCache;
        let request = req(1, "eth_chainId", Value::Null);
        cache.put(&request, &RpcResponse::success(json!(1), json!("0x1")));
        assert!(cache.get(&request).is_none());
    }

    #[test]
    fn test_hit_uses_callers_id() {
        let cache = MemoryRpcCache::new("mainnet", Duration::from_secs(60), 10);
        cache.put(&req(1, "eth_chainId", Value::Null), &RpcResponse::success(json!(1), json!("0x1")));

        let hit = cache.get(&req(7, "eth_chainId", Value::Null)).unwrap();
        assert_eq!(hit.id, json!(7));
        assert_eq!(hit.result, json!("0x1"));
    }

    #[test]
    fn test_params_and_namespace_are_part_of_key() {
        let cache = MemoryRpcCache::new("mainnet", Duration::from_secs(60), 10);
        let a = req(1, "eth_getTransactionByHash", json!(["0xaa"]));
        let b = req(1, "eth_getTransactionByHash", json!(["0xbb"]));
        cache.put(&a, &RpcResponse::success(json!(1), json!({"hash": "0xaa"})));
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());

        let other_chain = MemoryRpcCache::new("sepolia", Duration::from_secs(60), 10);
        assert_ne!(cache.key(&a), other_chain.key(&a));
    }

    #[test]
    fn test_skips_uncacheable_errors_and_nulls() {
        let cache = MemoryRpcCache::new("n", Duration::from_secs(60), 10);
        cache.put(&req(1, "eth_blockNumber", Value::Null), &RpcResponse::success(json!(1), json!("0x10")));
        cache.put(
            &req(1, "eth_chainId", Value::Null),
            &RpcResponse::error(json!(1), &ProxyError::BackendUnavailable),
        );
        cache.put(
            &req(1, "eth_getTransactionReceipt", json!(["0x01"])),
            &RpcResponse::success(json!(1), Value::Null),
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_miss() {
        let cache = MemoryRpcCache::new("n", Duration::ZERO, 10);
        let request = req(1, "net_version", Value::Null);
        cache.put(&request, &RpcResponse::success(json!(1), json!("1")));
        assert!(cache.get(&request).is_none());
    }

    #[test]
    fn test_bounded_size() {
        let cache = MemoryRpcCache::new("n", Duration::from_secs(60), 2);
        for i in 0..5 {
            let request = req(1, "eth_getBlockByHash", json!([format!("0x{}", i), false]));
            cache.put(&request, &RpcResponse::success(json!(1), json!({"n": i})));
        }
        assert_eq!(cache.len(), 2);
    }
}
