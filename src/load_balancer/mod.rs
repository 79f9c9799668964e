//! Backend forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Sub-batch for one group + RequestMetadata
//!     → group.rs (split into upstream chunks)
//!     → strategy.rs (order members: priority, round robin, health aware)
//!     → backend.rs (encode body, per-attempt retries)
//!         → url.rs (outbound URL, path/query augmentation)
//!         → security::headers (forwarded + signed headers)
//!         → transport.rs (admission gate, HTTP call)
//!     → responses aligned with the sub-batch, or BackendUnavailable
//! ```
//!
//! # Design Decisions
//! - Backends and groups are built once at startup and never mutated
//! - The admission gate is the only state shared between requests,
//!   besides passive health counters

pub mod backend;
pub mod group;
pub mod strategy;
pub mod transport;
pub mod url;

pub use backend::{Backend, BackendError};
pub use group::{build_backend_groups, BackendGroup, GroupResponse};
pub use strategy::SelectionStrategy;
pub use transport::LimitedClient;
