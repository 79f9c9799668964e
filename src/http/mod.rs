//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, request ID + trace layers)
//!     → request.rs (request ID, client identity, RequestMetadata)
//!     → server.rs (RpcServer: parse, validate, rate limit, cache, dispatch)
//!     → [load_balancer forwards per backend group]
//!     → response.rs (JSON-RPC body, served-by header, status)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{ForwardingPolicy, RequestMetadata, X_REQUEST_ID};
pub use response::X_SERVED_BY;
pub use server::{router, HttpServer, RpcServer};
