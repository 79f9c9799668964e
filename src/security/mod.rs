//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (body size, batch size, method allow-list)
//!     → rate_limit.rs (per-client and per-sender token buckets)
//!     → headers.rs (strip reserved headers, sign outbound bodies)
//!     → Pass to backend groups
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - The reserved auth header is never passed through from clients

pub mod headers;
pub mod limits;
pub mod rate_limit;

pub use headers::{HeaderProvider, FLASHBOTS_AUTH_HEADER};
pub use limits::{MethodAllowList, RequestLimits};
pub use rate_limit::{FrontendRateLimiter, NoopRateLimiter, RateLimiters, TokenBucketLimiter};
