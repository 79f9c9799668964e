//! Frontend rate limiting.
//!
//! Two independent limiters guard the dispatcher: one keyed by client
//! identity (whole-request rejection) and one keyed by transaction
//! `sender:nonce` (per-element rejection). Both are token buckets.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{RateLimitConfig, SenderRateLimitConfig};

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// A full bucket is indistinguishable from a fresh one and can be dropped.
    fn is_full(&self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens + elapsed * refill_rate >= capacity
    }
}

/// Every this many `take` calls, refilled buckets are swept.
const SWEEP_EVERY: u64 = 1024;

/// A keyed limiter. `take` consumes one unit for `key` and reports whether
/// the caller is still within its limit.
pub trait FrontendRateLimiter: Send + Sync {
    fn take(&self, key: &str) -> bool;
}

/// Limiter used when rate limiting is disabled.
#[derive(Debug, Default)]
pub struct NoopRateLimiter;

impl FrontendRateLimiter for NoopRateLimiter {
    fn take(&self, _key: &str) -> bool {
        true
    }
}

/// In-memory token bucket per key.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    buckets: DashMap<String, TokenBucket>,
    rps: f64,
    burst: f64,
    takes: AtomicU64,
}

impl TokenBucketLimiter {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            rps: requests_per_second as f64,
            burst: burst_size.max(1) as f64,
            takes: AtomicU64::new(0),
        }
    }

    /// Drop every bucket that has refilled to `burst`.
    fn sweep(&self) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| !bucket.is_full(now, self.burst, self.rps));
    }
}

impl FrontendRateLimiter for TokenBucketLimiter {
    fn take(&self, key: &str) -> bool {
        // Swept before the entry guard is taken; retain locks every shard.
        if self.takes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep();
        }
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst));
        bucket.try_acquire(self.burst, self.rps)
    }
}

/// The limiters consulted by the dispatcher, built once from config.
pub struct RateLimiters {
    pub ip: Arc<dyn FrontendRateLimiter>,
    pub sender: Arc<dyn FrontendRateLimiter>,
    sender_enabled: bool,
    sender_methods: HashSet<String>,
    allowed_chain_ids: Vec<u64>,
    exempt_signers: HashSet<Address>,
}

impl RateLimiters {
    pub fn from_config(ip: &RateLimitConfig, sender: &SenderRateLimitConfig) -> Self {
        let ip_limiter: Arc<dyn FrontendRateLimiter> = if ip.enabled {
            Arc::new(TokenBucketLimiter::new(ip.requests_per_second, ip.burst_size))
        } else {
            Arc::new(NoopRateLimiter)
        };
        let sender_limiter: Arc<dyn FrontendRateLimiter> = if sender.enabled {
            Arc::new(TokenBucketLimiter::new(sender.requests_per_second, sender.burst_size))
        } else {
            Arc::new(NoopRateLimiter)
        };

        let exempt_signers = ip
            .exempt_signers
            .iter()
            .filter_map(|s| match s.parse::<Address>() {
                Ok(address) => Some(address),
                Err(e) => {
                    tracing::warn!(signer = %s, error = %e, "Invalid exempt signer, ignoring");
                    None
                }
            })
            .collect();

        Self {
            ip: ip_limiter,
            sender: sender_limiter,
            sender_enabled: sender.enabled,
            sender_methods: sender.methods.iter().cloned().collect(),
            allowed_chain_ids: sender.allowed_chain_ids.clone(),
            exempt_signers,
        }
    }

    /// Limiters that never reject.
    pub fn disabled() -> Self {
        Self::from_config(&RateLimitConfig::default(), &SenderRateLimitConfig::default())
    }

    /// Whether calls to `method` carry a raw transaction subject to sender limits.
    pub fn applies_to_sender(&self, method: &str) -> bool {
        self.sender_enabled && self.sender_methods.contains(method)
    }

    pub fn allowed_chain_ids(&self) -> &[u64] {
        &self.allowed_chain_ids
    }

    pub fn is_exempt(&self, signer: &Address) -> bool {
        self.exempt_signers.contains(signer)
    }
}
