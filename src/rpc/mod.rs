//! JSON-RPC protocol subsystem.
//!
//! # Data Flow
//! ```text
//! inbound body
//!     → types.rs (single object or batch array → BatchElement per call)
//!     → [dispatcher validates, routes, forwards]
//!     → types.rs (upstream body → RpcResponse per call)
//!     → errors.rs (failures → JSON-RPC error objects)
//! ```

pub mod errors;
pub mod types;

pub use errors::ProxyError;
pub use types::{BatchElement, RpcError, RpcPayload, RpcRequest, RpcResponse};
