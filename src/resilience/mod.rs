//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Backend attempt fails (transport, status, malformed response):
//!     → backoff.rs (delay before the next attempt on the same backend)
//!     → retries exhausted: group fails over to the next member
//! ```
//!
//! Admission rejections (`TooManyRequests`) skip retries and fail over at once.

pub mod backoff;

pub use backoff::Backoff;
